// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! GPU generations and the bitmask encoding of `variants` strings.

use std::fmt;

/// Hardware generation of the command processor.
/// Declared from oldest to newest; the discriminant is the bit index
/// in [`GpuVariantMask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GpuVariant {
    A2xx = 0,
    A3xx = 1,
    A4xx = 2,
    A5xx = 3,
    A6xx = 4,
    A7xx = 5,
    A8xx = 6,
}

impl GpuVariant {
    /// All known generations, oldest first.
    pub const ALL: [GpuVariant; 7] = [
        GpuVariant::A2xx,
        GpuVariant::A3xx,
        GpuVariant::A4xx,
        GpuVariant::A5xx,
        GpuVariant::A6xx,
        GpuVariant::A7xx,
        GpuVariant::A8xx,
    ];

    pub const NEWEST: GpuVariant = GpuVariant::A8xx;

    /// Map a numeric hardware identifier to its generation.
    /// The identifier is the generation number, e.g. `6` for an A6XX
    /// part (chip id 630 divided by 100).
    pub fn from_gpu_id(id: u32) -> Option<GpuVariant> {
        id.checked_sub(2).and_then(|index| GpuVariant::ALL.get(index as usize)).copied()
    }

    /// Generation number, inverse of [`GpuVariant::from_gpu_id`].
    pub fn generation(self) -> u32 {
        self as u32 + 2
    }

    pub const fn bit(self) -> u8 {
        1 << (self as u8)
    }

    /// Name of the generation as spelled in `variants` attributes.
    pub fn name(self) -> &'static str {
        match self {
            GpuVariant::A2xx => "A2XX",
            GpuVariant::A3xx => "A3XX",
            GpuVariant::A4xx => "A4XX",
            GpuVariant::A5xx => "A5XX",
            GpuVariant::A6xx => "A6XX",
            GpuVariant::A7xx => "A7XX",
            GpuVariant::A8xx => "A8XX",
        }
    }

    fn from_index(index: usize) -> Option<GpuVariant> {
        GpuVariant::ALL.get(index).copied()
    }
}

impl fmt::Display for GpuVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for GpuVariant {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        GpuVariant::ALL
            .into_iter()
            .find(|variant| variant.name().eq_ignore_ascii_case(input))
            .ok_or_else(|| format!("unknown GPU generation {input:?}"))
    }
}

const ALL_BITS: u8 = (1 << GpuVariant::ALL.len()) - 1;

/// Set of GPU generations, one bit per [`GpuVariant`].
///
/// The empty mask means the item is unconstrained: it applies to every
/// generation. It never means "no generation".
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct GpuVariantMask(u8);

impl GpuVariantMask {
    pub const UNCONSTRAINED: GpuVariantMask = GpuVariantMask(0);

    pub const fn from_bits(bits: u8) -> GpuVariantMask {
        GpuVariantMask(bits & ALL_BITS)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_unconstrained(self) -> bool {
        self.0 == 0
    }

    /// Inclusive range of generations.
    pub fn range(first: GpuVariant, last: GpuVariant) -> GpuVariantMask {
        let (first, last) = if first <= last { (first, last) } else { (last, first) };
        GpuVariant::ALL
            .into_iter()
            .filter(|variant| (first..=last).contains(variant))
            .collect()
    }

    pub fn contains(self, variant: GpuVariant) -> bool {
        self.0 & variant.bit() != 0
    }

    /// Whether an item with this mask and an item with `other` can both
    /// apply on the same generation.
    pub fn overlaps(self, other: GpuVariantMask) -> bool {
        self.is_unconstrained() || other.is_unconstrained() || self.0 & other.0 != 0
    }

    /// Iterate the generations of the mask, oldest first.
    pub fn iter(self) -> impl Iterator<Item = GpuVariant> {
        GpuVariant::ALL.into_iter().filter(move |variant| self.contains(*variant))
    }

    pub fn oldest(self) -> Option<GpuVariant> {
        self.iter().next()
    }

    pub fn newest(self) -> Option<GpuVariant> {
        self.iter().last()
    }

    /// Encode a free-text variant applicability string.
    ///
    /// The string is scanned for `A<digit>XX` tokens:
    ///  - no token: unconstrained mask,
    ///  - tokens without a dash: each token is set,
    ///  - two tokens and a dash: inclusive range between the first two,
    ///  - one token and a dash: the token and all newer generations.
    pub fn parse(text: &str) -> GpuVariantMask {
        let tokens = scan_tokens(text);
        let Some(first) = tokens.first().copied() else {
            return GpuVariantMask::UNCONSTRAINED;
        };

        let mut mask: GpuVariantMask = tokens.iter().copied().collect();
        if text.contains('-') {
            let last = tokens.get(1).copied().unwrap_or(GpuVariant::NEWEST);
            mask = mask | GpuVariantMask::range(first, last);
        }
        mask
    }
}

/// Extract the known `A<digit>XX` tokens of a string in order of
/// appearance. Tokens naming an unknown generation are dropped.
fn scan_tokens(text: &str) -> Vec<GpuVariant> {
    let bytes = text.as_bytes();
    let mut tokens = vec![];
    let mut index = 0;
    while index + 4 <= bytes.len() {
        let window = &bytes[index..index + 4];
        if window[0] == b'A' && window[1].is_ascii_digit() && &window[2..] == b"XX" {
            let generation = (window[1] - b'0') as usize;
            if let Some(variant) = generation.checked_sub(2).and_then(GpuVariant::from_index) {
                tokens.push(variant);
            }
            index += 4;
        } else {
            index += 1;
        }
    }
    tokens
}

impl From<GpuVariant> for GpuVariantMask {
    fn from(variant: GpuVariant) -> Self {
        GpuVariantMask(variant.bit())
    }
}

impl FromIterator<GpuVariant> for GpuVariantMask {
    fn from_iter<I: IntoIterator<Item = GpuVariant>>(iter: I) -> Self {
        GpuVariantMask(iter.into_iter().fold(0, |bits, variant| bits | variant.bit()))
    }
}

impl std::ops::BitOr for GpuVariantMask {
    type Output = GpuVariantMask;
    fn bitor(self, rhs: GpuVariantMask) -> Self::Output {
        GpuVariantMask(self.0 | rhs.0)
    }
}

impl fmt::Display for GpuVariantMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unconstrained() {
            return f.write_str("*");
        }
        let names = self.iter().map(GpuVariant::name).collect::<Vec<_>>();
        f.write_str(&names.join("|"))
    }
}
