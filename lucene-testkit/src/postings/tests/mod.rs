mod block_format;
mod faults;
mod support;
