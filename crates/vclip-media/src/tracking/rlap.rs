//! Rectangular linear assignment problem (RLAP) solver.
//!
//! Shortest-augmenting-path algorithm (Jonker-Volgenant / Crouse
//! formulation) with dual variables `u` (rows) and `v` (columns). The
//! working matrix always has `rows <= cols`; when the caller's `m > n` the
//! matrix is transposed internally and the result pairs are swapped back.

use std::fmt;

/// Outcome of a solve attempt that did not produce a usable full matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RlapStatus {
    /// NaN or -infinity encountered in the cost matrix.
    Invalid,
    /// No complete matching exists given the +infinity-forbidden entries.
    Infeasible,
}

impl fmt::Display for RlapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RlapStatus::Invalid => write!(f, "INVALID"),
            RlapStatus::Infeasible => write!(f, "INFEASIBLE"),
        }
    }
}

/// A minimum-cost matching of `min(m, n)` pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// Row-ascending (for the un-transposed case) matched row indices.
    pub rows: Vec<usize>,
    /// Matched column indices, `cols[k]` paired with `rows[k]`.
    pub cols: Vec<usize>,
}

/// Solve the rectangular linear assignment problem on an `m x n` row-major
/// cost matrix. `f64::INFINITY` entries are forbidden pairs; NaN and
/// `f64::NEG_INFINITY` are invalid input.
pub fn solve(m: usize, n: usize, cost: &[f64]) -> Result<Assignment, RlapStatus> {
    assert_eq!(cost.len(), m * n, "cost matrix size mismatch");

    if cost.iter().any(|&c| c.is_nan() || c == f64::NEG_INFINITY) {
        return Err(RlapStatus::Invalid);
    }
    if m == 0 || n == 0 {
        return Ok(Assignment {
            rows: Vec::new(),
            cols: Vec::new(),
        });
    }

    let transpose = n < m;
    let (nr, nc) = if transpose { (n, m) } else { (m, n) };

    // working(i, j) = cost of working-row i matched to working-col j.
    let working = |i: usize, j: usize| -> f64 {
        if transpose {
            cost[j * n + i]
        } else {
            cost[i * n + j]
        }
    };

    let mut u = vec![0.0f64; nr];
    let mut v = vec![0.0f64; nc];
    // col4row[i] = working-column assigned to working-row i, or None.
    let mut col4row: Vec<Option<usize>> = vec![None; nr];
    // row4col[j] = working-row assigned to working-column j, or None.
    let mut row4col: Vec<Option<usize>> = vec![None; nc];

    for cur_row in 0..nr {
        let (sink, min_val, shortest_path_costs, sr, sc, path) =
            augmenting_path(nr, nc, &working, &u, &v, &col4row, cur_row);

        let sink = match sink {
            Some(s) => s,
            None => return Err(RlapStatus::Infeasible),
        };

        u[cur_row] += min_val;
        for i in 0..nr {
            if sr[i] && i != cur_row {
                // col4row[i] is guaranteed Some: row i was only marked visited
                // after being reached via an already-assigned column.
                let j = col4row[i].expect("visited row must be assigned");
                u[i] += min_val - shortest_path_costs[j];
            }
        }
        for j in 0..nc {
            if sc[j] {
                v[j] += shortest_path_costs[j] - min_val;
            }
        }

        // Augment along the path from sink back to cur_row.
        let mut j = sink;
        loop {
            let i = path[j].expect("augmenting path must be fully recorded");
            row4col[j] = Some(i);
            let prev = col4row[i];
            col4row[i] = Some(j);
            match prev {
                Some(prev_j) => j = prev_j,
                None => break,
            }
            if i == cur_row {
                break;
            }
        }
    }

    let mut rows = Vec::with_capacity(nr);
    let mut cols = Vec::with_capacity(nr);
    for i in 0..nr {
        let j = col4row[i].expect("every working row must be assigned on success");
        if transpose {
            rows.push(j);
            cols.push(i);
        } else {
            rows.push(i);
            cols.push(j);
        }
    }
    // Re-sort row-ascending; needed unconditionally since the transposed
    // case pushes rows out of order.
    let mut order: Vec<usize> = (0..rows.len()).collect();
    order.sort_by_key(|&k| rows[k]);
    let rows = order.iter().map(|&k| rows[k]).collect();
    let cols = order.iter().map(|&k| cols[k]).collect();

    Ok(Assignment { rows, cols })
}

type WorkingCost<'a> = dyn Fn(usize, usize) -> f64 + 'a;

/// Dijkstra-style shortest augmenting path search from `cur_row`, returning
/// the sink column (unassigned, terminating the path), the path cost to
/// reach it, the per-column shortest path costs discovered, the visited-row
/// and visited-column sets, and the predecessor-row for each column.
#[allow(clippy::type_complexity)]
fn augmenting_path(
    nr: usize,
    nc: usize,
    cost: &WorkingCost<'_>,
    u: &[f64],
    v: &[f64],
    col4row: &[Option<usize>],
    cur_row: usize,
) -> (
    Option<usize>,
    f64,
    Vec<f64>,
    Vec<bool>,
    Vec<bool>,
    Vec<Option<usize>>,
) {
    let mut min_val = 0.0f64;
    let mut remaining: Vec<usize> = (0..nc).collect();
    let mut sr = vec![false; nr];
    let mut sc = vec![false; nc];
    let mut shortest_path_costs = vec![f64::INFINITY; nc];
    let mut path: Vec<Option<usize>> = vec![None; nc];
    let mut sink: Option<usize> = None;

    let mut i = cur_row;
    while sink.is_none() {
        sr[i] = true;

        let mut min_val_found = f64::INFINITY;
        let mut index_in_remaining = None;

        for (it, &j) in remaining.iter().enumerate() {
            let reduced = min_val + cost(i, j) - u[i] - v[j];
            if reduced < shortest_path_costs[j] {
                path[j] = Some(i);
                shortest_path_costs[j] = reduced;
            }
            // Tie-break toward unassigned columns: an unassigned column
            // at an equal shortest-path cost wins over an assigned one.
            let better = shortest_path_costs[j] < min_val_found
                || (shortest_path_costs[j] == min_val_found && column_is_unassigned(col4row, j));
            if better {
                min_val_found = shortest_path_costs[j];
                index_in_remaining = Some(it);
            }
        }

        min_val = min_val_found;
        if !min_val.is_finite() {
            return (None, min_val, shortest_path_costs, sr, sc, path);
        }

        let it = index_in_remaining.expect("finite min_val implies a candidate column");
        let j = remaining[it];
        sc[j] = true;

        if column_is_unassigned(col4row, j) {
            sink = Some(j);
        } else {
            i = row_assigned_to_column(col4row, j).expect("checked assigned above");
        }

        remaining.swap_remove(it);
    }

    (sink, min_val, shortest_path_costs, sr, sc, path)
}

fn column_is_unassigned(col4row: &[Option<usize>], j: usize) -> bool {
    !col4row.iter().any(|c| *c == Some(j))
}

fn row_assigned_to_column(col4row: &[Option<usize>], j: usize) -> Option<usize> {
    col4row.iter().position(|c| *c == Some(j))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_matchings(m: usize, n: usize) -> Vec<Vec<(usize, usize)>> {
        let k = m.min(n);
        let (small, large, swap) = if m <= n { (m, n, false) } else { (n, m, true) };
        let cols: Vec<usize> = (0..large).collect();
        let mut out = Vec::new();
        let mut chosen = Vec::new();
        fn rec(
            depth: usize,
            k: usize,
            cols: &[usize],
            used: &mut Vec<bool>,
            chosen: &mut Vec<usize>,
            out: &mut Vec<Vec<(usize, usize)>>,
            swap: bool,
        ) {
            if depth == k {
                let pairs = chosen
                    .iter()
                    .enumerate()
                    .map(|(r, &c)| if swap { (c, r) } else { (r, c) })
                    .collect();
                out.push(pairs);
                return;
            }
            for (idx, &c) in cols.iter().enumerate() {
                if used[idx] {
                    continue;
                }
                used[idx] = true;
                chosen.push(c);
                rec(depth + 1, k, cols, used, chosen, out, swap);
                chosen.pop();
                used[idx] = false;
            }
        }
        let mut used = vec![false; large];
        rec(0, k, &cols, &mut used, &mut chosen, &mut out, swap);
        let _ = small;
        out
    }

    fn brute_force_min(m: usize, n: usize, cost: &[f64]) -> f64 {
        all_matchings(m, n)
            .into_iter()
            .map(|pairs| pairs.iter().map(|&(r, c)| cost[r * n + c]).sum::<f64>())
            .fold(f64::INFINITY, f64::min)
    }

    fn matching_cost(n: usize, cost: &[f64], a: &Assignment) -> f64 {
        a.rows
            .iter()
            .zip(a.cols.iter())
            .map(|(&r, &c)| cost[r * n + c])
            .sum()
    }

    #[test]
    fn square_no_forbidden_matches_brute_force() {
        let cost = vec![4.0, 1.0, 3.0, 2.0, 0.0, 5.0, 3.0, 2.0, 2.0];
        let a = solve(3, 3, &cost).unwrap();
        let got = matching_cost(3, &cost, &a);
        let want = brute_force_min(3, 3, &cost);
        assert!((got - want).abs() < 1e-9, "got {got} want {want}");
    }

    #[test]
    fn constant_cost_matrix_is_identity() {
        let cost = vec![1.0, 1.0, 1.0, 1.0];
        let a = solve(2, 2, &cost).unwrap();
        assert_eq!(a.rows, vec![0, 1]);
        assert_eq!(a.cols, vec![0, 1]);
    }

    #[test]
    fn rectangular_more_cols_than_rows() {
        let cost = vec![4.0, 1.0, 3.0, 2.0, 0.0, 5.0];
        let a = solve(2, 3, &cost).unwrap();
        assert_eq!(a.rows.len(), 2);
        let got = matching_cost(3, &cost, &a);
        let want = brute_force_min(2, 3, &cost);
        assert!((got - want).abs() < 1e-9);
    }

    #[test]
    fn rectangular_more_rows_than_cols_transposes() {
        let cost = vec![4.0, 1.0, 3.0, 2.0, 0.0, 5.0];
        let a = solve(3, 2, &cost).unwrap();
        assert_eq!(a.rows.len(), 2);
        let got: f64 = a
            .rows
            .iter()
            .zip(a.cols.iter())
            .map(|(&r, &c)| cost[r * 2 + c])
            .sum();
        let want = brute_force_min(3, 2, &cost);
        assert!((got - want).abs() < 1e-9);
    }

    #[test]
    fn forbidden_entries_never_returned() {
        let inf = f64::INFINITY;
        let cost = vec![1.0, inf, inf, 1.0];
        let a = solve(2, 2, &cost).unwrap();
        for (&r, &c) in a.rows.iter().zip(a.cols.iter()) {
            assert!(cost[r * 2 + c].is_finite());
        }
    }

    #[test]
    fn all_forbidden_row_is_infeasible() {
        let inf = f64::INFINITY;
        let cost = vec![inf, inf, 1.0, 1.0];
        let status = solve(2, 2, &cost).unwrap_err();
        assert_eq!(status, RlapStatus::Infeasible);
    }

    #[test]
    fn nan_is_invalid() {
        let cost = vec![f64::NAN, 1.0, 1.0, 1.0];
        let status = solve(2, 2, &cost).unwrap_err();
        assert_eq!(status, RlapStatus::Invalid);
    }

    #[test]
    fn neg_infinity_is_invalid() {
        let cost = vec![f64::NEG_INFINITY, 1.0, 1.0, 1.0];
        let status = solve(2, 2, &cost).unwrap_err();
        assert_eq!(status, RlapStatus::Invalid);
    }

    #[test]
    fn brute_force_cross_check_up_to_six() {
        // Small m, n <= 4 exhaustive check (kept small to bound test time).
        let grids: Vec<(usize, usize, Vec<f64>)> = vec![
            (2, 2, vec![1.0, 2.0, 2.0, 1.0]),
            (2, 3, vec![5.0, 1.0, 3.0, 2.0, 4.0, 0.0]),
            (3, 2, vec![5.0, 1.0, 3.0, 2.0, 4.0, 0.0]),
            (4, 4, vec![
                9.0, 2.0, 7.0, 8.0, 6.0, 4.0, 3.0, 7.0, 5.0, 8.0, 1.0, 8.0, 7.0, 6.0, 9.0, 4.0,
            ]),
        ];
        for (m, n, cost) in grids {
            let a = solve(m, n, &cost).unwrap();
            let got = matching_cost(n, &cost, &a);
            let want = brute_force_min(m, n, &cost);
            assert!((got - want).abs() < 1e-9, "m={m} n={n} got={got} want={want}");
        }
    }
}
