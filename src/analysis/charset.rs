use nom::branch::alt;
use nom::bytes::complete::{tag, take_while_m_n};
use nom::character::complete::{char, multispace0, none_of};
use nom::combinator::{all_consuming, map, map_res, not, opt, peek};
use nom::multi::separated_list0;
use nom::sequence::{delimited, preceded, terminated};
use nom::{IResult, Parser};
use crate::core::error::{Error, Result};

const CHUNK_COUNT: usize = 0x300;
const CHUNK_BITS: u32 = 8;
const CHUNK_SIZE: usize = 1 << CHUNK_BITS;
const CHUNK_MASK: u32 = CHUNK_SIZE as u32 - 1;

/// Codepoints at or above this value are never word characters.
pub const MAX_CODE: u32 = (CHUNK_COUNT * CHUNK_SIZE) as u32;

pub const MASK_CODEPOINT: u32 = 0x00ff_ffff;
/// Tokenizes as a single-character token
pub const FLAG_SPECIAL: u32 = 1 << 29;
/// Special character that was already a word character
pub const FLAG_DUAL: u32 = 1 << 30;
/// Emitted as n-grams rather than whole words
pub const FLAG_NGRAM: u32 = 1 << 31;

pub const DEFAULT_SBCS_TABLE: &str =
    "0..9, A..Z->a..z, _, a..z, U+A8->U+B8, U+B8, U+C0..U+DF->U+E0..U+FF, U+E0..U+FF";
pub const DEFAULT_UTF8_TABLE: &str =
    "0..9, A..Z->a..z, _, a..z, U+410..U+42F->U+430..U+44F, U+430..U+44F, U+401->U+451, U+451";

/// Lowercaser remap range: `start..=end` maps onto `remap_start..`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemapRange {
    pub start: u32,
    pub end: u32,
    pub remap_start: u32,
}

impl RemapRange {
    pub fn new(start: u32, end: u32, remap_start: u32) -> Self {
        RemapRange { start, end, remap_start }
    }
}

/// Sparse codepoint table. Unallocated chunks read as zero ("not a word
/// character") without holding any memory.
#[derive(Clone)]
pub struct Lowercaser {
    chunks: Vec<Option<Box<[u32]>>>,
}

impl Lowercaser {
    pub fn new() -> Self {
        Lowercaser {
            chunks: vec![None; CHUNK_COUNT],
        }
    }

    pub fn reset(&mut self) {
        self.chunks.iter_mut().for_each(|c| *c = None);
    }

    /// Number of chunks actually allocated.
    pub fn allocated_chunks(&self) -> usize {
        self.chunks.iter().filter(|c| c.is_some()).count()
    }

    /// Folded codepoint plus flags; 0 for separators.
    #[inline]
    pub fn to_lower(&self, code: u32) -> u32 {
        if code >= MAX_CODE {
            return 0;
        }
        match &self.chunks[(code >> CHUNK_BITS) as usize] {
            Some(chunk) => chunk[(code & CHUNK_MASK) as usize],
            None => 0,
        }
    }

    /// Folded codepoint with the flags stripped.
    #[inline]
    pub fn fold(&self, code: u32) -> u32 {
        self.to_lower(code) & MASK_CODEPOINT
    }

    /// Merges ranges into the table. `flags_if_exists` is only added for
    /// codepoints that already had a non-zero mapping.
    pub fn add_remaps(&mut self, ranges: &[RemapRange], flags: u32, flags_if_exists: u32) {
        let mut sorted = ranges.to_vec();
        sorted.sort_by_key(|r| r.start);

        for range in &sorted {
            for (i, code) in (range.start..=range.end.min(MAX_CODE - 1)).enumerate() {
                let remap = range.remap_start + i as u32;
                let chunk = self.chunks[(code >> CHUNK_BITS) as usize]
                    .get_or_insert_with(|| vec![0u32; CHUNK_SIZE].into_boxed_slice());
                let slot = &mut chunk[(code & CHUNK_MASK) as usize];
                let existing = if *slot & MASK_CODEPOINT != 0 { flags_if_exists } else { 0 };
                *slot = (remap & MASK_CODEPOINT) | flags | existing;
            }
        }
    }

    /// Layers special characters on top; word characters become dual.
    pub fn add_specials(&mut self, specials: &str) {
        let ranges: Vec<RemapRange> = specials
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| RemapRange::new(c as u32, c as u32, c as u32))
            .collect();
        self.add_remaps(&ranges, FLAG_SPECIAL, FLAG_DUAL);
    }

    pub(crate) fn mapped_codes(&self) -> impl Iterator<Item = u32> + '_ {
        self.chunks.iter().enumerate().flat_map(|(ci, chunk)| {
            chunk.iter().flat_map(move |c| {
                c.iter()
                    .enumerate()
                    .filter(|(_, v)| **v != 0)
                    .map(move |(i, _)| ((ci as u32) << CHUNK_BITS) | i as u32)
            })
        })
    }

    /// Builds a table from a textual definition such as
    /// `"0..9, A..Z->a..z, a..z, U+410..U+42F->U+430..U+44F"`.
    /// Remap targets that are not mapped themselves are added as
    /// identities, and remap chains are rejected, so folding is idempotent.
    pub fn from_config(config: &str) -> Result<Self> {
        let ranges = parse_ranges(config)?;
        let mut lc = Lowercaser::new();
        lc.add_remaps(&ranges, 0, 0);

        let missing: Vec<RemapRange> = lc
            .mapped_codes()
            .map(|c| lc.fold(c))
            .filter(|&f| f < MAX_CODE && lc.to_lower(f) == 0)
            .map(|f| RemapRange::new(f, f, f))
            .collect();
        lc.add_remaps(&missing, 0, 0);

        if let Some(code) = lc.mapped_codes().find(|&c| {
            let f = lc.fold(c);
            lc.fold(f) != f
        }) {
            return Err(Error::config(format!(
                "case folding chain at U+{:04X}: U+{:04X} is remapped again",
                code,
                lc.fold(code)
            )));
        }
        Ok(lc)
    }
}

impl Default for Lowercaser {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
enum Span {
    Single(u32),
    Range(u32, u32),
}

fn unicode_escape(input: &str) -> IResult<&str, u32> {
    map_res(
        preceded(
            alt((tag("U+"), tag("u+"))),
            take_while_m_n(1, 6, |c: char| c.is_ascii_hexdigit()),
        ),
        |hex: &str| u32::from_str_radix(hex, 16),
    )
    .parse(input)
}

fn codepoint(input: &str) -> IResult<&str, u32> {
    alt((unicode_escape, map(none_of(", \t\r\n"), |c| c as u32))).parse(input)
}

fn range_sep(input: &str) -> IResult<&str, &str> {
    alt((tag(".."), terminated(tag("-"), not(peek(char('>')))))).parse(input)
}

fn span(input: &str) -> IResult<&str, Span> {
    alt((
        map(
            (codepoint, delimited(multispace0, range_sep, multispace0), codepoint),
            |(a, _, b)| Span::Range(a, b),
        ),
        map(codepoint, Span::Single),
    ))
    .parse(input)
}

fn item(input: &str) -> IResult<&str, (Span, Option<Span>)> {
    (
        span,
        opt(preceded(delimited(multispace0, tag("->"), multispace0), span)),
    )
        .parse(input)
}

fn item_list(input: &str) -> IResult<&str, Vec<(Span, Option<Span>)>> {
    all_consuming(delimited(
        multispace0,
        terminated(
            separated_list0(delimited(multispace0, char(','), multispace0), item),
            opt(preceded(multispace0, char(','))),
        ),
        multispace0,
    ))
    .parse(input)
}

/// Parses a charset table definition into remap ranges.
pub fn parse_ranges(config: &str) -> Result<Vec<RemapRange>> {
    let (_, items) = item_list(config).map_err(|e| {
        let near = match &e {
            nom::Err::Error(err) | nom::Err::Failure(err) => err.input,
            nom::Err::Incomplete(_) => "",
        };
        Error::config(format!(
            "charset table syntax error near '{}'",
            near.chars().take(16).collect::<String>()
        ))
    })?;

    let mut ranges = Vec::with_capacity(items.len());
    for (from, to) in items {
        let range = match (from, to) {
            (Span::Single(c), None) => RemapRange::new(c, c, c),
            (Span::Single(c), Some(Span::Single(d))) => RemapRange::new(c, c, d),
            (Span::Range(a, b), None) => RemapRange::new(a, b, a),
            (Span::Range(a, b), Some(Span::Range(c, d))) => {
                if b < a || d < c || b - a != d - c {
                    return Err(Error::config(format!(
                        "remap range lengths differ: U+{:04X}..U+{:04X}->U+{:04X}..U+{:04X}",
                        a, b, c, d
                    )));
                }
                RemapRange::new(a, b, c)
            }
            (from, Some(to)) => {
                return Err(Error::config(format!(
                    "cannot remap {:?} onto {:?}: both sides must be ranges or single characters",
                    from, to
                )));
            }
        };
        if range.end < range.start {
            return Err(Error::config(format!(
                "inverted range U+{:04X}..U+{:04X}",
                range.start, range.end
            )));
        }
        let top = range.end.max(range.remap_start + (range.end - range.start));
        if top >= MAX_CODE {
            return Err(Error::config(format!(
                "codepoint U+{:04X} is out of the supported range",
                top
            )));
        }
        ranges.push(range);
    }
    ranges.sort_by_key(|r| r.start);
    Ok(ranges)
}
