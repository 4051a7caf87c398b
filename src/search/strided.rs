use crate::compare::less_than;
use crate::oram::{read_at_xor, read_public, ArrayView, PaddedView, SharedArray, StridedView};
use crate::party::error::MpcResult;
use crate::party::MainParty;
use crate::search::{strided_window, IndexAccumulator};
use crate::share::{ArithShare, HasZero, XorShare};

/// Returns an XOR share of the number of elements of `array` that are less than `target`.
///
/// The first probe is at the public midpoint. Each later round only reads the midpoints of
/// the windows that are still reachable, selected by the bits found so far.
pub fn strided_search(
    party: &mut MainParty,
    array: &SharedArray,
    target: ArithShare,
) -> MpcResult<XorShare> {
    let role = party.role();
    if array.is_empty() {
        return Ok(XorShare::ZERO);
    }
    let padded = PaddedView::new(array, role);
    let depth = padded.depth();

    tracing::debug!(depth, "strided search public probe");
    let first = read_public(&padded, padded.width() / 2 - 1)?;
    let lt = less_than(party, first - target)?;
    if depth == 1 {
        return Ok(XorShare::from_bit(lt));
    }

    let mut acc = IndexAccumulator::new(depth).append(lt)?;
    let mut d = depth - 1;
    while d > 0 {
        let (offset, stride, extent) = strided_window(depth, d);
        tracing::debug!(depth = d, width = extent, "strided search round");
        let view = StridedView::new(&padded, offset, stride, extent)?;
        let value = read_at_xor(party, &view, acc.current())?;
        let lt = less_than(party, value - target)?;
        acc = acc.append(lt)?;
        d -= 1;
    }
    Ok(acc.materialize())
}

#[cfg(test)]
mod test {
    use crate::search::test::{lower_bound, reconstruct, run_search, run_searches};
    use crate::search::SearchVariant;

    #[test]
    fn concrete_scenarios() {
        assert_eq!(run_search(SearchVariant::Strided, &[1, 3, 5, 7, 9], 6).0, 3);
        assert_eq!(run_search(SearchVariant::Strided, &[2, 4, 6, 8], 6).0, 2);
        assert_eq!(run_search(SearchVariant::Strided, &[5], 5).0, 0);
        assert_eq!(run_search(SearchVariant::Strided, &[5], 6).0, 1);
        assert_eq!(run_search(SearchVariant::Strided, &[], 6).0, 0);
    }

    #[test]
    fn all_targets_small_arrays() {
        let arrays: Vec<Vec<i64>> = vec![
            vec![0],
            vec![-3, 4],
            vec![1, 1, 1],
            vec![-9, -2, 0, 0, 7, 8, 20],
            (0..8).map(|i| 2 * i).collect(),
        ];
        let targets: Vec<i64> = (-10..=21).collect();
        for values in arrays {
            let (r0, r1, _) = run_searches(SearchVariant::Strided, &values, &targets);
            for (i, target) in targets.iter().enumerate() {
                let index = reconstruct(r0[i], r1[i]);
                assert_eq!(index, lower_bound(&values, *target), "{:?}, target {}", values, target);
            }
        }
    }

    #[test]
    fn growing_read_widths() {
        let values: Vec<i64> = (0..20).map(|i| 5 * i).collect();
        let (index, cost) = run_search(SearchVariant::Strided, &values, 51);
        assert_eq!(index, 11);
        // padded to 32
        assert_eq!(cost.comparisons, 5);
        assert_eq!(cost.read_widths, vec![2, 4, 8, 16]);
    }

    #[test]
    fn single_element_has_no_oblivious_read() {
        let (index, cost) = run_search(SearchVariant::Strided, &[7], 100);
        assert_eq!(index, 1);
        assert_eq!(cost.comparisons, 1);
        assert!(cost.read_widths.is_empty());
    }
}
