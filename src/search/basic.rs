use crate::compare::less_than;
use crate::mul::bit_to_arith;
use crate::oram::{read_at_arith, ArrayView, PaddedView, SharedArray};
use crate::party::error::MpcResult;
use crate::party::MainParty;
use crate::share::{as_local_share, ArithShare};

/// Returns an additive share of the number of elements of `array` that are less than `target`.
///
/// Every round reads obliviously over the whole padded array. The index always points at
/// the last position of the left half of the remaining window.
pub fn basic_search(
    party: &mut MainParty,
    array: &SharedArray,
    target: ArithShare,
) -> MpcResult<ArithShare> {
    let role = party.role();
    if array.is_empty() {
        return Ok(as_local_share(0, role));
    }
    let view = PaddedView::new(array, role);
    let width = view.width();
    let mut index = as_local_share((width / 2 - 1) as u64, role);
    let mut depth = view.depth();
    while depth > 0 {
        tracing::debug!(depth, width, "basic search round");
        let value = read_at_arith(party, &view, index)?;
        let lt = less_than(party, value - target)?;
        // the step is public, scaling the converted bit is local
        let right = bit_to_arith(party, &[lt])?[0] * (1 << (depth - 1));
        if depth > 1 {
            index = index - as_local_share(1 << (depth - 2), role) + right;
        } else {
            index += right;
        }
        depth -= 1;
    }
    Ok(index)
}

#[cfg(test)]
mod test {
    use crate::oram::{padded_size, SharedArray};
    use crate::party::test_export::simple_localhost_setup;
    use crate::party::MainParty;
    use crate::search::test::{lower_bound, reconstruct, run_search, run_searches};
    use crate::search::{basic_search, SearchVariant};
    use crate::share::test::reconstruct_arith;
    use crate::share::ArithShare;

    #[test]
    fn concrete_scenarios() {
        assert_eq!(run_search(SearchVariant::Basic, &[1, 3, 5, 7, 9], 6).0, 3);
        assert_eq!(run_search(SearchVariant::Basic, &[2, 4, 6, 8], 6).0, 2);
        assert_eq!(run_search(SearchVariant::Basic, &[5], 5).0, 0);
        assert_eq!(run_search(SearchVariant::Basic, &[5], 6).0, 1);
        assert_eq!(run_search(SearchVariant::Basic, &[], 6).0, 0);
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
            let (r0, r1, _) = run_searches(SearchVariant::Basic, &values, &targets);
            for (i, target) in targets.iter().enumerate() {
                let index = reconstruct(r0[i], r1[i]);
                assert_eq!(index, lower_bound(&values, *target), "{:?}, target {}", values, target);
            }
        }
    }

    #[test]
    fn full_width_reads() {
        let values: Vec<i64> = (0..11).collect();
        let (_, cost) = run_search(SearchVariant::Basic, &values, 4);
        let width = padded_size(values.len());
        assert_eq!(width, 16);
        assert_eq!(cost.comparisons, 4);
        assert_eq!(cost.read_widths, vec![width; 4]);
    }

    #[test]
    fn empty_array_needs_no_rounds() {
        fn search(p: &mut MainParty) -> (ArithShare, u64) {
            p.reset_comm_stats();
            let res = basic_search(p, &SharedArray::from_shares(vec![]), ArithShare(3)).unwrap();
            (res, p.comm_stats().bytes_sent)
        }
        let (((r0, sent0), (r1, sent1)), (p0, _)) = simple_localhost_setup(search);
        assert_eq!(reconstruct_arith(r0, r1), 0);
        assert_eq!(sent0 + sent1, 0);
        assert_eq!(p0.search_cost().comparisons, 0);
        assert!(p0.search_cost().read_widths.is_empty());
    }
}
