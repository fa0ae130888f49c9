//! Problem instance: grid size plus the pre-assigned cells.
//!
//! The wire format is a whitespace-separated stream of integers: `n` followed
//! by `row col color` triples until end of input. The same format is emitted
//! by `Display`, so generated instances round-trip.

use crate::domain::MAX_BITS;
use anyhow::{bail, ensure, Context, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Assignment {
    pub row: usize,
    pub col: usize,
    pub color: usize,
}

#[derive(Clone, Debug)]
pub struct Instance {
    n: usize,
    fixed: Vec<Assignment>,
}

impl Instance {
    pub fn new(n: usize, fixed: Vec<Assignment>) -> Result<Self> {
        ensure!(n >= 1 && n <= MAX_BITS, "grid size {} out of range [1, {}]", n, MAX_BITS);
        for a in &fixed {
            ensure!(
                a.row < n && a.col < n && a.color < n,
                "pre-assignment ({}, {}) = {} out of range for n = {}",
                a.row,
                a.col,
                a.color,
                n
            );
        }
        Ok(Instance { n, fixed })
    }

    pub fn size(&self) -> usize {
        self.n
    }

    pub fn fixed(&self) -> &[Assignment] {
        &self.fixed
    }

    pub fn parse(input: &str) -> Result<Self> {
        let mut tokens = input.split_ascii_whitespace();
        let n: usize = match tokens.next() {
            Some(t) => t.parse().with_context(|| format!("bad grid size {:?}", t))?,
            None => bail!("empty instance"),
        };
        let mut fixed = Vec::new();
        loop {
            let row = match tokens.next() {
                Some(t) => parse_field(t, "row")?,
                None => break,
            };
            let col = match tokens.next() {
                Some(t) => parse_field(t, "col")?,
                None => bail!("truncated pre-assignment after row {}", row),
            };
            let color = match tokens.next() {
                Some(t) => parse_field(t, "color")?,
                None => bail!("truncated pre-assignment at ({}, {})", row, col),
            };
            fixed.push(Assignment { row, col, color });
        }
        Instance::new(n, fixed)
    }

    pub fn from_reader(mut reader: impl std::io::Read) -> Result<Self> {
        let mut buf = String::new();
        reader.read_to_string(&mut buf).context("reading instance")?;
        Instance::parse(&buf)
    }
}

fn parse_field(token: &str, what: &str) -> Result<usize> {
    token
        .parse()
        .with_context(|| format!("bad {} value {:?}", what, token))
}

impl std::fmt::Display for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.n)?;
        for a in &self.fixed {
            writeln!(f, "{} {} {}", a.row, a.col, a.color)?;
        }
        Ok(())
    }
}
