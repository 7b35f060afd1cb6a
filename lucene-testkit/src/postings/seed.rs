//! Oracle postings regenerated from a per-term seed
//!
//! Two random sources are derived from the seed: `doc_random` drives doc
//! spacing only, `random` drives everything else. Consuming positions
//! therefore never perturbs doc ids, so a docs-only stream and a positional
//! stream from the same seed visit the same docs.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::codec::PostingsEnum;
use crate::error::{Error, Result};
use crate::index::IndexOptions;
use crate::{DocId, NO_MORE_DOCS, UNPOSITIONED};

pub struct SeedPostings {
    random: StdRng,
    doc_random: StdRng,
    doc_freq: i32,
    max_doc_spacing: i32,
    payload_size: usize,
    fixed_payloads: bool,
    do_positions: bool,
    allow_payloads: bool,

    /// Docs returned so far
    upto: i32,
    doc_id: DocId,
    freq: i32,
    pos_upto: i32,
    pos: i32,
    pos_spacing: i32,
    offset: i32,
    start_offset: i32,
    end_offset: i32,
    payload: Vec<u8>,
    payload_len: usize,
}

impl SeedPostings {
    pub fn new(
        seed: u64,
        min_doc_freq: i32,
        max_doc_freq: i32,
        options: IndexOptions,
        allow_payloads: bool,
    ) -> Self {
        let mut random = StdRng::seed_from_u64(seed);
        let doc_random = StdRng::seed_from_u64(random.random::<u64>());
        let doc_freq = random.random_range(min_doc_freq..=max_doc_freq);
        let max_doc_spacing = random.random_range(1..=100);
        let payload_size = if random.random_range(0..10) == 7 {
            random.random_range(1..=3)
        } else {
            1
        };
        let fixed_payloads = random.random_bool(0.5);

        Self {
            random,
            doc_random,
            doc_freq,
            max_doc_spacing,
            payload_size,
            fixed_payloads,
            do_positions: options.has_positions(),
            allow_payloads,
            upto: 0,
            doc_id: -1,
            freq: 0,
            pos_upto: 0,
            pos: 0,
            pos_spacing: 1,
            offset: 0,
            start_offset: -1,
            end_offset: -1,
            payload: vec![0; payload_size],
            payload_len: 0,
        }
    }

    pub fn doc_freq(&self) -> i32 {
        self.doc_freq
    }

    /// Number of docs returned so far.
    pub fn upto(&self) -> i32 {
        self.upto
    }

    fn draw_freq(&mut self) -> i32 {
        if self.random.random_range(0..200) == 17 {
            self.random.random_range(1..=1000)
        } else if self.random.random_range(0..10) == 7 {
            self.random.random_range(1..=20)
        } else {
            self.random.random_range(1..=4)
        }
    }

    fn draw_payload(&mut self) {
        let len = if self.fixed_payloads {
            self.random.fill(&mut self.payload[..]);
            self.payload_size
        } else {
            let drawn = self.random.random_range(0..self.payload_size);
            if drawn != 0 {
                self.random.fill(&mut self.payload[..]);
            }
            drawn
        };
        self.payload_len = if self.allow_payloads { len } else { 0 };
    }
}

impl PostingsEnum for SeedPostings {
    fn doc_id(&self) -> DocId {
        self.doc_id
    }

    fn next_doc(&mut self) -> Result<DocId> {
        if self.doc_id == -1 {
            self.doc_id = 0;
        }
        // Leftover positions still consume `random`
        while self.pos_upto < self.freq {
            self.next_position()?;
        }

        if self.upto >= self.doc_freq {
            self.doc_id = NO_MORE_DOCS;
            return Ok(NO_MORE_DOCS);
        }
        if self.upto == 0 && self.doc_random.random_bool(0.5) {
            // first doc stays 0
        } else if self.max_doc_spacing == 1 {
            self.doc_id += 1;
        } else {
            self.doc_id += self.doc_random.random_range(1..=self.max_doc_spacing);
        }

        self.freq = self.draw_freq();
        self.pos = 0;
        self.offset = 0;
        self.pos_upto = 0;
        self.pos_spacing = self.random.random_range(1..=100);
        self.upto += 1;
        Ok(self.doc_id)
    }

    /// Stepping advance, the reference every codec's skipping is held to.
    fn advance(&mut self, target: DocId) -> Result<DocId> {
        let mut doc = self.doc_id;
        while doc < target {
            doc = self.next_doc()?;
        }
        Ok(doc)
    }

    fn freq(&self) -> Result<i32> {
        Ok(self.freq)
    }

    fn next_position(&mut self) -> Result<i32> {
        if !self.do_positions {
            self.pos_upto = self.freq;
            return Ok(UNPOSITIONED);
        }
        if self.pos_upto >= self.freq {
            return Err(Error::Codec(format!(
                "oracle asked for position {} of doc {} with freq {}",
                self.pos_upto + 1,
                self.doc_id,
                self.freq
            )));
        }

        if self.pos_upto == 0 && self.random.random_bool(0.5) {
            // first position stays 0
        } else if self.pos_spacing == 1 {
            self.pos += 1;
        } else {
            self.pos += self.random.random_range(1..=self.pos_spacing);
        }

        self.draw_payload();

        self.start_offset = self.offset + self.random.random_range(0..5);
        self.end_offset = self.start_offset + self.random.random_range(0..10);
        self.offset = self.end_offset;

        self.pos_upto += 1;
        Ok(self.pos)
    }

    fn start_offset(&self) -> Result<i32> {
        Ok(self.start_offset)
    }

    fn end_offset(&self) -> Result<i32> {
        Ok(self.end_offset)
    }

    fn payload(&self) -> Result<Option<&[u8]>> {
        if self.payload_len == 0 {
            Ok(None)
        } else {
            Ok(Some(&self.payload[..self.payload_len]))
        }
    }

    fn cost(&self) -> i64 {
        self.doc_freq as i64
    }
}
