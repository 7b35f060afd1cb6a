mod no_merge;
mod pathological;
