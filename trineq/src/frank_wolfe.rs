//! Frank–Wolfe subproblem: given the quovecs of the inflation events found so far, find the
//! point of minimum Euclidean norm in their convex hull (spec §4.12). A strictly positive norm,
//! together with every stored vertex scoring positive against the returned direction, is a
//! certificate that the target distribution is not in the local polytope of the inflation.

use crate::event::Event;
use enum_dispatch::enum_dispatch;
use std::collections::BTreeSet;

use crate::error::{Error, Result};

/// The norm below which the current iterate is treated as the origin (spec §4.12).
const INCONCLUSIVE_TOLERANCE: f64 = 1.0e-12;
/// The lazy tolerance `K` used to shrink `Φ` on the first step of a [`Pairwise`] solve.
const LAZY_TOLERANCE: f64 = 1.0;
/// Vertices whose weight drops below this are dropped from the active set.
const CLEANUP_TOLERANCE: f64 = 1.0e-10;
/// How often (in active-set size) [`Pairwise::solve`] sweeps the active set for weight drift,
/// on top of the inline removals `take_pairwise_step` already performs.
const CLEANUP_PERIOD: usize = 20;

/// The solution returned by a [`FrankWolfe::solve`] call.
#[derive(Clone, Debug)]
pub struct Solution {
    /// The Euclidean norm of [`Self::vec`].
    pub s: f64,
    /// The candidate certificate direction, `‖vec‖ ≤ 1`.
    pub vec: Vec<f64>,
    /// `true` iff `s > 0` and `vec` scores strictly positive against every stored vertex.
    pub valid: bool,
}

/// Shared interface of the two Frank–Wolfe subproblem solvers (spec §4.12).
#[enum_dispatch]
pub trait FrankWolfe {
    /// Rescales the integer quovec `quovec` by `denom` and remembers it alongside `event`.
    fn memorize_event_and_quovec(&mut self, event: &Event, quovec: &[i64], denom: f64) {
        let row: Vec<f64> = quovec.iter().map(|&q| q as f64 / denom).collect();
        self.memorize_event_and_quovec_double(event, &row);
    }

    /// Remembers `event` alongside its already-rescaled quovec `row`.
    fn memorize_event_and_quovec_double(&mut self, event: &Event, row: &[f64]);

    /// Finds the point of minimum norm in the convex hull of every stored vertex.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SolverNonOptimal`] if the underlying subproblem solver fails to reach an
    /// optimal solution.
    fn solve(&mut self) -> Result<Solution>;

    /// The inflation events passed to [`Self::memorize_event_and_quovec`] since the last
    /// [`Self::reset`].
    fn stored_events(&self) -> &BTreeSet<Event>;

    /// `self.stored_events().len()`.
    fn n_stored_events(&self) -> usize;

    /// Clears every stored vertex, keeping the dimension.
    fn reset(&mut self);
}

/// Either of the two Frank–Wolfe subproblem solvers (spec §4.12).
#[enum_dispatch(FrankWolfe)]
pub enum Engine {
    /// Solves the dual second-order-cone program with `clarabel`.
    FullyCorrective(FullyCorrective),
    /// Self-contained pairwise Frank–Wolfe, no external solver required.
    Pairwise(Pairwise),
}

fn inner_product(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

// ---------------------------------------------------------------------------------------------
// Fully-corrective variant
// ---------------------------------------------------------------------------------------------

/// Solves, on every call to [`FrankWolfe::solve`], the dual program `maximize s s.t. ‖w‖ ≤ 1, s ≤
/// ⟨w, v⟩` for every stored vertex `v`, via the second-order-cone solver `clarabel`.
pub struct FullyCorrective {
    dimension: usize,
    events: BTreeSet<Event>,
    matrix: Vec<Vec<f64>>,
}

impl FullyCorrective {
    /// Creates a solver over vertices of dimension `dimension`, with an empty active set.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self { dimension, events: BTreeSet::new(), matrix: Vec::new() }
    }

    fn min_inner_product(&self, w: &[f64]) -> f64 {
        self.matrix.iter().map(|v| inner_product(w, v)).fold(f64::INFINITY, f64::min)
    }

    /// Builds and solves the SOCP over the current active set, returning `(s, w)`.
    fn solve_socp(&self) -> Result<(f64, Vec<f64>)> {
        use clarabel::algebra::CscMatrix;
        use clarabel::solver::{DefaultSettingsBuilder, DefaultSolver, IPSolver, NonnegativeConeT, SecondOrderConeT, SolverStatus};

        let dim = self.dimension;
        let m = self.matrix.len();
        let n_vars = dim + 1;
        let s_col = dim;

        // P = 0: the objective `maximize s` is linear in (w, s).
        let p = CscMatrix::zeros((n_vars, n_vars));

        let mut q = vec![0.0; n_vars];
        q[s_col] = -1.0;

        // Rows 0..=dim: the SOC constraint (1, w) ∈ SOC(dim + 1).
        // Rows dim+1..dim+1+m: one `⟨w, v_k⟩ - s ≥ 0` row per stored vertex.
        let mut colptr = Vec::with_capacity(n_vars + 1);
        let mut rowval = Vec::new();
        let mut nzval = Vec::new();
        colptr.push(0);

        for j in 0..dim {
            rowval.push(1 + j);
            nzval.push(-1.0);
            for (k, v) in self.matrix.iter().enumerate() {
                rowval.push(dim + 1 + k);
                nzval.push(-v[j]);
            }
            colptr.push(rowval.len());
        }
        // The `s` column only appears in the nonnegative-cone rows, with coefficient +1.
        for k in 0..m {
            rowval.push(dim + 1 + k);
            nzval.push(1.0);
        }
        colptr.push(rowval.len());

        let n_rows = dim + 1 + m;
        let a = CscMatrix::new(n_rows, n_vars, colptr, rowval, nzval);

        let mut b = vec![0.0; n_rows];
        b[0] = 1.0;

        let cones = [SecondOrderConeT(dim + 1), NonnegativeConeT(m)];

        let settings = DefaultSettingsBuilder::default().verbose(false).build().map_err(|e| Error::SolverNonOptimal(e.to_string()))?;

        let mut solver = DefaultSolver::new(&p, &q, &a, &b, &cones, settings);
        solver.solve();

        if solver.solution.status != SolverStatus::Solved {
            return Err(Error::SolverNonOptimal(format!("{:?}", solver.solution.status)));
        }

        let w = solver.solution.x[..dim].to_vec();
        let s = solver.solution.x[s_col];
        Ok((s, w))
    }
}

impl FrankWolfe for FullyCorrective {
    fn memorize_event_and_quovec_double(&mut self, event: &Event, row: &[f64]) {
        self.events.insert(event.clone());
        self.matrix.push(row.to_vec());
    }

    fn solve(&mut self) -> Result<Solution> {
        assert!(!self.matrix.is_empty(), "solve() requires at least one stored vertex");

        let (s, w) = self.solve_socp()?;
        let min_inner_product = self.min_inner_product(&w);
        let valid = s > 0.0 && min_inner_product > 0.0;

        Ok(Solution { s, vec: w, valid })
    }

    fn stored_events(&self) -> &BTreeSet<Event> {
        &self.events
    }

    fn n_stored_events(&self) -> usize {
        self.events.len()
    }

    fn reset(&mut self) {
        self.events.clear();
        self.matrix.clear();
    }
}

// ---------------------------------------------------------------------------------------------
// Pairwise variant
// ---------------------------------------------------------------------------------------------

/// Maps a pair `(i, j) ∈ ℕ²` to a flat index, used to store the symmetric `⟨d_i, d_j⟩` cache as
/// one triangular array (the two write sites, `(i, j)` and `(j, i)`, map to different indices
/// holding the same value).
const fn pair_index(i: usize, j: usize) -> usize {
    let s = i + j;
    (s * s + i + 3 * j) / 2
}

/// The active set and cached inner products backing [`Pairwise`]: the current iterate `x = Σ_μ
/// weight_μ vertex_μ`, its squared norm, and every pairwise vertex dot product.
struct Data {
    dimension: usize,
    events: Vec<Event>,
    weights: Vec<f64>,
    vertices: Vec<Vec<f64>>,
    x_dot_vertex: Vec<f64>,
    vertex_dot_vertex: Vec<f64>,
    x_dot_x: f64,
    x: Vec<f64>,
}

impl Data {
    fn new(dimension: usize) -> Self {
        Self {
            dimension,
            events: Vec::new(),
            weights: Vec::new(),
            vertices: Vec::new(),
            x_dot_vertex: Vec::new(),
            vertex_dot_vertex: Vec::new(),
            x_dot_x: 0.0,
            x: vec![0.0; dimension],
        }
    }

    fn reset(&mut self) {
        self.events.clear();
        self.weights.clear();
        self.vertices.clear();
        self.x_dot_vertex.clear();
        self.vertex_dot_vertex.clear();
        self.x_dot_x = 0.0;
        self.x = vec![0.0; self.dimension];
    }

    fn vertex_count(&self) -> usize {
        self.events.len()
    }

    fn vertex_dot_vertex(&self, i: usize, j: usize) -> f64 {
        self.vertex_dot_vertex[pair_index(i, j)]
    }

    fn set_vertex_dot_vertex(&mut self, i: usize, j: usize, value: f64) {
        self.vertex_dot_vertex[pair_index(i, j)] = value;
    }

    fn memorize_event_and_vertex(&mut self, event: Event, vertex: Vec<f64>) {
        self.events.push(event);
        self.vertices.push(vertex);
        let new_i = self.vertex_count() - 1;

        if new_i == 0 {
            self.weights.push(1.0);
            self.x_dot_vertex.push(0.0);
            self.update_x_from_weights();
        } else {
            self.weights.push(0.0);
            self.x_dot_vertex.push(inner_product(&self.vertices[new_i], &self.x));
        }

        self.vertex_dot_vertex.resize(2 * self.vertex_count() * (self.vertex_count() - 1) + 1, 0.0);
        for j in 0..self.vertex_count() {
            let ip = inner_product(&self.vertices[new_i], &self.vertices[j]);
            self.set_vertex_dot_vertex(new_i, j, ip);
            self.set_vertex_dot_vertex(j, new_i, ip);
        }
    }

    fn take_pairwise_step(&mut self, i_min: usize, i_max: usize) {
        let norm_direction_squared = self.vertex_dot_vertex(i_max, i_max) - 2.0 * self.vertex_dot_vertex(i_max, i_min) + self.vertex_dot_vertex(i_min, i_min);

        let mut gamma = if norm_direction_squared > 1.0e-20 {
            (self.x_dot_vertex[i_max] - self.x_dot_vertex[i_min]) / norm_direction_squared
        } else {
            0.0
        };
        let gamma_max = self.weights[i_max];
        gamma = gamma.clamp(0.0, gamma_max);

        self.x_dot_x = 0.0;
        for d in 0..self.dimension {
            self.x[d] -= gamma * (self.vertices[i_max][d] - self.vertices[i_min][d]);
            self.x_dot_x += self.x[d] * self.x[d];
        }

        for i in 0..self.vertex_count() {
            self.x_dot_vertex[i] -= gamma * (self.vertex_dot_vertex(i_max, i) - self.vertex_dot_vertex(i_min, i));
        }

        self.weights[i_min] += gamma;
        self.weights[i_max] -= gamma;
        if self.weights[i_max] < CLEANUP_TOLERANCE {
            self.remove_vertex(i_max);
        }
    }

    fn clean_up_vertices(&mut self) -> Result<()> {
        let mut removed_any = false;
        let mut i = 0;
        while i < self.vertex_count() {
            if self.weights[i] < CLEANUP_TOLERANCE {
                self.remove_vertex(i);
                removed_any = true;
            } else {
                i += 1;
            }
        }

        let sum: f64 = self.weights.iter().sum();
        if sum > 1.0 + CLEANUP_TOLERANCE {
            return Err(Error::Invariant(format!("pairwise Frank-Wolfe vertex weights summed to {sum}")));
        }
        for w in &mut self.weights {
            *w /= sum;
        }

        if removed_any {
            self.update_x_from_weights();
        }
        Ok(())
    }

    /// Swap-removes vertex `i`, invalidating every index into the active set but `i` itself.
    fn remove_vertex(&mut self, i: usize) {
        let last = self.vertex_count() - 1;
        self.events.swap_remove(i);
        self.weights.swap_remove(i);
        self.vertices.swap_remove(i);
        self.x_dot_vertex.swap_remove(i);

        for j in 0..self.vertex_count() {
            if j == i {
                continue;
            }
            let ip = self.vertex_dot_vertex(last, j);
            self.set_vertex_dot_vertex(i, j, ip);
            self.set_vertex_dot_vertex(j, i, ip);
        }
        let diag = self.vertex_dot_vertex(last, last);
        self.set_vertex_dot_vertex(i, i, diag);
    }

    /// Checks the invariants of testable property 9: weights are non-negative and sum to 1, `x`
    /// matches the weighted sum of vertices, and every cached inner product agrees with a fresh
    /// recomputation. Intended for tests and diagnostics, not the hot path.
    fn check_health(&self) -> Result<()> {
        const EPSILON: f64 = 1.0e-10;

        let weight_sum: f64 = self.weights.iter().sum();
        if self.weights.iter().any(|&w| w < -EPSILON) {
            return Err(Error::Invariant("pairwise Frank-Wolfe vertex weight went negative".to_string()));
        }
        if (weight_sum - 1.0).abs() >= EPSILON {
            return Err(Error::Invariant(format!("pairwise Frank-Wolfe vertex weights summed to {weight_sum}")));
        }

        let mut x_vs_convex_error = 0.0;
        for d in 0..self.dimension {
            let convex_component: f64 = (0..self.vertex_count()).map(|i| self.weights[i] * self.vertices[i][d]).sum();
            x_vs_convex_error += (self.x[d] - convex_component).abs();
        }
        if x_vs_convex_error >= EPSILON {
            return Err(Error::Invariant(format!("pairwise Frank-Wolfe iterate drifted from its convex combination by {x_vs_convex_error}")));
        }

        if (self.x_dot_x - inner_product(&self.x, &self.x)).abs() >= EPSILON {
            return Err(Error::Invariant("pairwise Frank-Wolfe cached ‖x‖² disagrees with a fresh recomputation".to_string()));
        }

        for i in 0..self.vertex_count() {
            if (inner_product(&self.x, &self.vertices[i]) - self.x_dot_vertex[i]).abs() >= EPSILON {
                return Err(Error::Invariant(format!("pairwise Frank-Wolfe cached ⟨x, d_{i}⟩ disagrees with a fresh recomputation")));
            }
            for j in 0..self.vertex_count() {
                if (inner_product(&self.vertices[i], &self.vertices[j]) - self.vertex_dot_vertex(i, j)).abs() >= EPSILON {
                    return Err(Error::Invariant(format!("pairwise Frank-Wolfe cached ⟨d_{i}, d_{j}⟩ disagrees with a fresh recomputation")));
                }
            }
        }

        Ok(())
    }

    fn update_x_from_weights(&mut self) {
        self.x_dot_x = 0.0;
        for d in 0..self.dimension {
            self.x[d] = 0.0;
            for i in 0..self.vertex_count() {
                self.x[d] += self.weights[i] * self.vertices[i][d];
            }
            self.x_dot_x += self.x[d] * self.x[d];
        }
        for i in 0..self.vertex_count() {
            self.x_dot_vertex[i] = inner_product(&self.x, &self.vertices[i]);
        }
    }
}

/// Self-contained pairwise Frank–Wolfe (spec §4.12), grounded on Designolle, Iommazzo, Besançon,
/// Knebel, Gelß & Pokutta, "Improved local models and new Bell inequalities via Frank-Wolfe
/// algorithms", Phys. Rev. Research 5, 043059 (2023), Appendix C.
pub struct Pairwise {
    data: Data,
    events: BTreeSet<Event>,
    /// The lazy-tolerance parameter Φ, halved whenever the first step of a `solve()` call turns
    /// out not to make enough progress.
    phi: f64,
}

impl Pairwise {
    /// Creates a solver over vertices of dimension `dimension`, with an empty active set.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self { data: Data::new(dimension), events: BTreeSet::new(), phi: 0.0 }
    }

    fn is_inconclusive(&self) -> bool {
        self.data.x_dot_x < INCONCLUSIVE_TOLERANCE
    }

    /// Checks testable property 9 against the current active set: non-negative weights summing
    /// to 1, `x` matching the weighted sum of stored vertices, and every cached inner product
    /// agreeing with a fresh recomputation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invariant`] if any of the above fails to hold within tolerance.
    pub fn check_health(&self) -> Result<()> {
        self.data.check_health()
    }

    fn current_solution(&self) -> Solution {
        Solution { s: self.data.x_dot_x.sqrt(), vec: self.data.x.clone(), valid: !self.is_inconclusive() }
    }

    /// Picks `(i_min, i_max)` by maximizing `(⟨x, d_i⟩ - ⟨x, d_j⟩) / ‖d_i - d_j‖` over ordered
    /// pairs (the default pair-selection strategy used by [`FrankWolfe::solve`]).
    fn find_pair_normalized(&self) -> (usize, usize) {
        let n = self.data.vertex_count();
        assert!(n > 0, "find_pair_normalized requires at least one vertex");

        let mut best_score = f64::NEG_INFINITY;
        let mut i_min = 0;
        let mut i_max = 0;

        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let norm_sq = self.data.vertex_dot_vertex(i, i) - 2.0 * self.data.vertex_dot_vertex(i, j) + self.data.vertex_dot_vertex(j, j);
                if norm_sq <= 0.0 {
                    continue;
                }
                let norm = norm_sq.sqrt();
                let score = (self.data.x_dot_vertex[i] - self.data.x_dot_vertex[j]) / norm;
                if score > best_score {
                    best_score = score;
                    i_min = j;
                    i_max = i;
                }
            }
        }

        (i_min, i_max)
    }

    /// Picks `(i_min, i_max)` by the classical min/max of `⟨x, d_μ⟩` over the active set. Kept
    /// alongside [`Self::find_pair_normalized`] for comparison; not used by [`FrankWolfe::solve`].
    #[must_use]
    pub fn find_pair_classical(&self) -> (usize, usize) {
        let n = self.data.vertex_count();
        assert!(n > 0, "find_pair_classical requires at least one vertex");

        let mut i_min = 0;
        let mut i_max = 0;
        let mut min_inner = f64::MAX;
        let mut max_inner = f64::MIN;

        for i in 0..n {
            let current = self.data.x_dot_vertex[i];
            if current > max_inner {
                max_inner = current;
                i_max = i;
            }
            if current < min_inner {
                min_inner = current;
                i_min = i;
            }
        }

        (i_min, i_max)
    }
}

impl FrankWolfe for Pairwise {
    fn memorize_event_and_quovec_double(&mut self, event: &Event, row: &[f64]) {
        self.data.memorize_event_and_vertex(event.clone(), row.to_vec());
        self.events.insert(event.clone());

        if self.data.vertex_count() == 1 {
            self.phi = 0.5 * inner_product(row, row);
        }
    }

    fn solve(&mut self) -> Result<Solution> {
        assert!(self.data.vertex_count() > 0, "solve() requires at least one stored vertex");

        if self.data.vertex_count() == 1 {
            return Ok(self.current_solution());
        }

        let mut first_step = true;
        loop {
            if self.is_inconclusive() {
                break;
            }

            let (i_min, i_max) = self.find_pair_normalized();
            let gap = self.data.x_dot_vertex[i_max] - self.data.x_dot_vertex[i_min];

            if first_step && gap < self.phi / LAZY_TOLERANCE {
                self.phi *= 0.5;
            }
            if gap < self.phi {
                break;
            }

            self.data.take_pairwise_step(i_min, i_max);
            first_step = false;

            // Drop-step removals already strip individual vertices inline; weight drift from
            // repeated floating-point steps only gets swept up and renormalized here.
            if self.data.vertex_count() % CLEANUP_PERIOD == 0 {
                self.data.clean_up_vertices()?;
            }
        }

        self.data.clean_up_vertices()?;
        Ok(self.current_solution())
    }

    fn stored_events(&self) -> &BTreeSet<Event> {
        &self.events
    }

    fn n_stored_events(&self) -> usize {
        self.data.vertex_count()
    }

    fn reset(&mut self) {
        self.data.reset();
        self.events.clear();
        self.phi = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::approx_eq;

    #[test]
    fn pair_index_matches_the_two_vertex_case() {
        // With two vertices the cache must hold exactly the 4 entries (0,0), (0,1), (1,0), (1,1)
        // within the 5-slot buffer `memorize_event_and_vertex` allocates for them.
        assert_eq!(pair_index(0, 0), 0);
        assert_eq!(pair_index(1, 0), 1);
        assert_eq!(pair_index(0, 1), 2);
        assert_eq!(pair_index(1, 1), 4);
    }

    #[test]
    fn pairwise_single_vertex_returns_that_vertex() {
        let mut pw = Pairwise::new(2);
        let event = vec![0, 1];
        pw.memorize_event_and_quovec(&event, &[3, 4], 1.0);

        let sol = pw.solve().unwrap();
        assert!(approx_eq!(f64, sol.s, 5.0, epsilon = 1e-9));
        assert!(sol.valid);
        assert_eq!(pw.n_stored_events(), 1);
    }

    #[test]
    fn pairwise_two_opposite_vertices_converge_towards_the_origin() {
        let mut pw = Pairwise::new(1);
        pw.memorize_event_and_quovec(&vec![0], &[10], 1.0);
        pw.memorize_event_and_quovec(&vec![1], &[-10], 1.0);

        let sol = pw.solve().unwrap();
        assert!(sol.s < 1e-6);
        assert!(!sol.valid);
    }

    #[test]
    fn pairwise_reset_clears_all_state() {
        let mut pw = Pairwise::new(1);
        pw.memorize_event_and_quovec(&vec![0], &[5], 1.0);
        pw.reset();
        assert_eq!(pw.n_stored_events(), 0);
    }

    #[test]
    fn pairwise_solve_leaves_the_active_set_healthy() {
        let mut pw = Pairwise::new(2);
        pw.memorize_event_and_quovec(&vec![0], &[3, 0], 1.0);
        pw.memorize_event_and_quovec(&vec![1], &[0, 3], 1.0);
        pw.memorize_event_and_quovec(&vec![2], &[-3, -3], 1.0);

        pw.solve().unwrap();
        pw.check_health().unwrap();
    }

    #[test]
    fn classical_and_normalized_pair_selection_agree_on_two_vertices() {
        let mut pw = Pairwise::new(1);
        pw.memorize_event_and_quovec(&vec![0], &[10], 1.0);
        pw.memorize_event_and_quovec(&vec![1], &[-10], 1.0);

        assert_eq!(pw.find_pair_classical(), pw.find_pair_normalized());
    }

    #[test]
    fn fully_corrective_single_vertex_matches_its_norm() {
        let mut fc = FullyCorrective::new(2);
        fc.memorize_event_and_quovec(&vec![0], &[3, 4], 1.0);

        let sol = fc.solve().unwrap();
        assert!(approx_eq!(f64, sol.s, 5.0, epsilon = 1e-6));
        assert!(sol.valid);
    }

    #[test]
    fn fully_corrective_and_pairwise_agree_on_norm() {
        let vertices: [(Event, [i64; 2]); 3] = [(vec![0], [10, 0]), (vec![1], [-5, 8]), (vec![2], [-5, -8])];

        let mut fc = FullyCorrective::new(2);
        let mut pw = Pairwise::new(2);
        for (event, q) in &vertices {
            fc.memorize_event_and_quovec(event, q, 1.0);
            pw.memorize_event_and_quovec(event, q, 1.0);
        }

        let fc_sol = fc.solve().unwrap();
        let pw_sol = pw.solve().unwrap();
        assert!(approx_eq!(f64, fc_sol.s, pw_sol.s, epsilon = 1e-4));
    }
}
