//! Splitters: fan a wide bundle into narrower ones.
//!
//! End 0 is the combined side. Ends `1..=fanout` are the split sides. The
//! routing table `bit_end[i]` names the split end that carries bit `i` of the
//! combined side; 0 leaves the bit unmapped. A bit's position inside its
//! split end (its *thread index*) is its rank among the bits routed there.

use super::{EndData, EndKind};
use crate::circuit::{BitWidth, ComponentId, Location};
use crate::error::{GatesimError, Result};

#[derive(Debug, Clone)]
pub struct Splitter {
    pub id: ComponentId,
    /// Combined end location.
    pub combined: Location,
    /// Split end locations, end 1 first.
    pub split_ends: Vec<Location>,
    bit_end: Vec<u8>,
    bit_thread: Vec<Option<u8>>,
    end_widths: Vec<BitWidth>,
}

impl Splitter {
    /// Create a splitter of `width` bits. Without a routing table, bits are
    /// spread evenly over the split ends in ascending order.
    pub fn new(
        id: ComponentId,
        combined: Location,
        split_ends: Vec<Location>,
        width: u8,
        bit_end: Option<Vec<u8>>,
    ) -> Result<Self> {
        if split_ends.is_empty() || split_ends.len() > u8::MAX as usize {
            return Err(GatesimError::topology("splitter needs between 1 and 255 split ends"));
        }
        if width == 0 || width > BitWidth::MAX_BITS {
            return Err(GatesimError::topology(format!("invalid splitter width {}", width)));
        }
        let fanout = split_ends.len() as u8;
        let bit_end = bit_end.unwrap_or_else(|| Self::default_mapping(fanout, width));
        let mut splitter = Self {
            id,
            combined,
            split_ends,
            bit_end: Vec::new(),
            bit_thread: Vec::new(),
            end_widths: Vec::new(),
        };
        splitter.configure(bit_end)?;
        Ok(splitter)
    }

    /// Even ascending distribution of `bits` over `fanout` ends; earlier
    /// ends take the remainder.
    pub fn default_mapping(fanout: u8, bits: u8) -> Vec<u8> {
        if fanout >= bits {
            return (1..=bits).collect();
        }
        let per_end = bits / fanout;
        let mut extra = bits % fanout;
        let mut ret = Vec::with_capacity(bits as usize);
        let mut end = 0u8;
        let mut left = 0u8;
        for _ in 0..bits {
            if left == 0 {
                end += 1;
                left = per_end;
                if extra > 0 {
                    left += 1;
                    extra -= 1;
                }
            }
            ret.push(end);
            left -= 1;
        }
        ret
    }

    /// Copy of this splitter with a new routing table.
    pub fn with_mapping(&self, bit_end: Vec<u8>) -> Result<Self> {
        let mut next = self.clone();
        next.configure(bit_end)?;
        Ok(next)
    }

    fn configure(&mut self, bit_end: Vec<u8>) -> Result<()> {
        let fanout = self.fanout();
        if bit_end.is_empty() || bit_end.len() > BitWidth::MAX_BITS as usize {
            return Err(GatesimError::topology("splitter routing table must cover 1..=64 bits"));
        }
        if let Some(bad) = bit_end.iter().find(|&&e| e as usize > fanout) {
            return Err(GatesimError::topology(format!(
                "splitter routes a bit to end {} but has only {} split ends",
                bad, fanout
            )));
        }

        let mut counts = vec![0u8; fanout + 1];
        counts[0] = bit_end.len() as u8;
        let bit_thread = bit_end
            .iter()
            .map(|&end| {
                if end == 0 {
                    return None;
                }
                let thread = counts[end as usize];
                counts[end as usize] += 1;
                Some(thread)
            })
            .collect();

        self.end_widths = counts.into_iter().map(BitWidth::new).collect();
        self.bit_thread = bit_thread;
        self.bit_end = bit_end;
        Ok(())
    }

    pub fn fanout(&self) -> usize {
        self.split_ends.len()
    }

    /// Width of the combined side.
    pub fn width(&self) -> BitWidth {
        BitWidth::new(self.bit_end.len() as u8)
    }

    pub fn bit_end(&self) -> &[u8] {
        &self.bit_end
    }

    /// Position of combined bit `bit` within its split end.
    pub fn bit_thread(&self, bit: usize) -> Option<usize> {
        self.bit_thread.get(bit).copied().flatten().map(usize::from)
    }

    /// Location of end `index` (0 = combined).
    pub fn end_location(&self, index: usize) -> Option<Location> {
        if index == 0 {
            Some(self.combined)
        } else {
            self.split_ends.get(index - 1).copied()
        }
    }

    /// Ends in index order; split ends with no routed bits have unknown width.
    pub fn ends(&self) -> Vec<EndData> {
        let mut ends = Vec::with_capacity(self.fanout() + 1);
        ends.push(EndData::new(self.combined, self.width(), EndKind::InputOutput));
        for (i, &loc) in self.split_ends.iter().enumerate() {
            let width = self.end_widths.get(i + 1).copied().unwrap_or(BitWidth::UNKNOWN);
            ends.push(EndData::new(loc, width, EndKind::InputOutput));
        }
        ends
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(x: i32, y: i32) -> Location {
        Location::new(x, y)
    }

    #[test]
    fn test_default_mapping() {
        assert_eq!(Splitter::default_mapping(2, 8), vec![1, 1, 1, 1, 2, 2, 2, 2]);
        assert_eq!(Splitter::default_mapping(3, 7), vec![1, 1, 1, 2, 2, 3, 3]);
        assert_eq!(Splitter::default_mapping(4, 2), vec![1, 2]);
    }

    #[test]
    fn test_threads_and_widths() {
        let s = Splitter::new(
            ComponentId(0),
            loc(0, 0),
            vec![loc(5, 0), loc(5, 1)],
            6,
            Some(vec![2, 1, 0, 2, 1, 2]),
        )
        .unwrap();
        assert_eq!(s.bit_thread(0), Some(0));
        assert_eq!(s.bit_thread(1), Some(0));
        assert_eq!(s.bit_thread(2), None);
        assert_eq!(s.bit_thread(3), Some(1));
        assert_eq!(s.bit_thread(5), Some(2));

        let ends = s.ends();
        assert_eq!(ends[0].width, BitWidth::new(6));
        assert_eq!(ends[1].width, BitWidth::new(2));
        assert_eq!(ends[2].width, BitWidth::new(3));
    }

    #[test]
    fn test_rejects_bad_mapping() {
        assert!(Splitter::new(ComponentId(0), loc(0, 0), vec![loc(1, 0)], 2, Some(vec![1, 2])).is_err());
        let s = Splitter::new(ComponentId(0), loc(0, 0), vec![loc(1, 0)], 2, None).unwrap();
        assert!(s.with_mapping(vec![3, 1]).is_err());
        assert_eq!(s.with_mapping(vec![0, 1]).unwrap().bit_thread(1), Some(0));
    }
}
