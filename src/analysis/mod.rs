/// Numerical core of the storm-tide forecast correction service.
///
/// Submodules, in pipeline order:
/// - `normalize`  - heterogeneous ensemble CSV → canonical station rows.
/// - `extract`    - one station's rows across every archive member.
/// - `trend`      - short-term observed trend fit and near-term blend.
/// - `exceedance` - per-time threshold exceedance probabilities.
/// - `peak`       - peak window, confidence and recommendation.

pub mod exceedance;
pub mod extract;
pub mod normalize;
pub mod peak;
pub mod trend;
