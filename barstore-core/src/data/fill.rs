//! Gap-fill policy for a single column.
//!
//! Order matters and is fixed: linear interpolation of interior gaps, then
//! forward-fill of trailing gaps, then backward-fill of leading gaps. Long
//! provider outages are bridged by interpolation just like short ones, so
//! filled values in a wide gap are fabricated, not observed.

/// How many cells each pass filled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FillCounts {
    pub interpolated: usize,
    pub forward_filled: usize,
    pub backward_filled: usize,
}

impl FillCounts {
    pub fn total(&self) -> usize {
        self.interpolated + self.forward_filled + self.backward_filled
    }
}

impl std::ops::AddAssign for FillCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.interpolated += rhs.interpolated;
        self.forward_filled += rhs.forward_filled;
        self.backward_filled += rhs.backward_filled;
    }
}

/// Linearly interpolate nulls that have an observed value on both sides.
///
/// Rows are treated as equally spaced (positional interpolation).
pub fn interpolate_interior(cells: &mut [Option<f64>]) -> usize {
    let mut filled = 0;
    let mut last_known: Option<(usize, f64)> = None;

    for j in 0..cells.len() {
        let Some(right) = cells[j] else { continue };
        if let Some((i, left)) = last_known {
            let span = (j - i) as f64;
            for (k, cell) in cells.iter_mut().enumerate().take(j).skip(i + 1) {
                let w = (k - i) as f64 / span;
                *cell = Some(left + (right - left) * w);
                filled += 1;
            }
        }
        last_known = Some((j, right));
    }
    filled
}

/// Carry the last observed value forward over nulls.
pub fn forward_fill(cells: &mut [Option<f64>]) -> usize {
    let mut filled = 0;
    let mut last = None;
    for cell in cells.iter_mut() {
        match cell {
            Some(v) => last = Some(*v),
            None if last.is_some() => {
                *cell = last;
                filled += 1;
            }
            None => {}
        }
    }
    filled
}

/// Carry the next observed value backward over nulls.
pub fn backward_fill(cells: &mut [Option<f64>]) -> usize {
    let mut filled = 0;
    let mut next = None;
    for cell in cells.iter_mut().rev() {
        match cell {
            Some(v) => next = Some(*v),
            None if next.is_some() => {
                *cell = next;
                filled += 1;
            }
            None => {}
        }
    }
    filled
}

/// Apply all three passes in policy order.
pub fn fill_gaps(cells: &mut [Option<f64>]) -> FillCounts {
    FillCounts {
        interpolated: interpolate_interior(cells),
        forward_filled: forward_fill(cells),
        backward_filled: backward_fill(cells),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolates_between_neighbours() {
        let mut cells = vec![Some(1.0), None, None, Some(4.0)];
        assert_eq!(interpolate_interior(&mut cells), 2);
        assert_eq!(cells, vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)]);
    }

    #[test]
    fn interpolation_leaves_edges_alone() {
        let mut cells = vec![None, Some(2.0), None, Some(4.0), None];
        assert_eq!(interpolate_interior(&mut cells), 1);
        assert_eq!(cells, vec![None, Some(2.0), Some(3.0), Some(4.0), None]);
    }

    #[test]
    fn full_policy_fills_everything() {
        let mut cells = vec![None, None, Some(10.0), None, Some(20.0), None];
        let counts = fill_gaps(&mut cells);
        assert_eq!(
            cells,
            vec![Some(10.0), Some(10.0), Some(10.0), Some(15.0), Some(20.0), Some(20.0)]
        );
        assert_eq!(
            counts,
            FillCounts {
                interpolated: 1,
                forward_filled: 1,
                backward_filled: 2
            }
        );
        assert_eq!(counts.total(), 4);
    }

    #[test]
    fn all_null_stays_null() {
        let mut cells = vec![None; 4];
        assert_eq!(fill_gaps(&mut cells).total(), 0);
        assert!(cells.iter().all(Option::is_none));
    }

    #[test]
    fn observed_cells_are_never_touched() {
        let mut cells = vec![Some(3.0), None, Some(-1.0)];
        fill_gaps(&mut cells);
        assert_eq!(cells[0], Some(3.0));
        assert_eq!(cells[2], Some(-1.0));
        assert_eq!(cells[1], Some(1.0));
    }
}
