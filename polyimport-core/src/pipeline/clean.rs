//! Boundary cleaning sequence run before areas are assigned.

use log::{info, warn};

use super::RunContext;
use crate::{ImportOptions, PrimitiveKind, TopologyEngine};

/// Outcome of the cleaning sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanSummary {
    /// Rounds of the break, dedupe and small-angle loop.
    pub iterations: usize,
    /// Whether the loop reached a round without small-angle modifications.
    pub converged: bool,
    /// Number of areas after the final build.
    pub areas: usize,
}

pub(crate) fn should_clean<T: TopologyEngine + ?Sized>(
    topology: &T,
    ctx: &RunContext,
    options: &ImportOptions,
) -> bool {
    !options.no_clean
        && ctx.n_polygon_boundaries > 0
        && topology.primitive_count(PrimitiveKind::Boundary) > 0
}

/// Run the fixed cleaning sequence and build areas.
///
/// The break, dedupe and small-angle loop repeats until a small-angle pass
/// modifies nothing. With `max_clean_iterations` set the loop also stops
/// after that many rounds and the summary reports `converged = false`.
pub fn clean_boundaries<T: TopologyEngine + ?Sized>(
    topology: &mut T,
    options: &ImportOptions,
) -> CleanSummary {
    info!("Cleaning polygons");
    if let Some(threshold) = options.snap.filter(|t| *t >= 0.0) {
        info!("Snapping boundaries (threshold = {threshold:.3e})...");
        topology.snap(threshold);
    }
    info!("Breaking polygons...");
    topology.break_polygons();
    info!("Removing duplicates...");
    topology.remove_duplicates();

    let mut iterations = 0;
    let converged = loop {
        iterations += 1;
        topology.break_lines();
        topology.remove_duplicates();
        let modified = topology.clean_small_angles();
        info!("Cleaning boundaries at nodes: {modified} modified (round {iterations})");
        if modified == 0 {
            break true;
        }
        if options.max_clean_iterations.is_some_and(|cap| iterations >= cap) {
            warn!("Boundary cleaning did not converge after {iterations} rounds");
            break false;
        }
    };

    info!("Merging boundaries...");
    topology.merge_boundaries();
    if options.types.lines_as_boundaries {
        info!("Changing boundary dangles to lines...");
        topology.change_dangles_to_lines();
    } else {
        info!("Removing dangles...");
        topology.remove_dangles();
    }
    topology.build_areas();
    if options.types.lines_as_boundaries {
        info!("Changing boundary bridges to lines...");
        topology.change_bridges_to_lines();
    } else {
        info!("Removing bridges...");
        topology.remove_bridges();
    }
    let areas = topology.build_areas();
    CleanSummary {
        iterations,
        converged,
        areas,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedTopology;
    use rstest::{fixture, rstest};

    #[fixture]
    fn options() -> ImportOptions {
        ImportOptions::new("out")
    }

    #[rstest]
    fn runs_operations_in_order(mut options: ImportOptions) {
        options.snap = Some(0.01);
        let mut topology = ScriptedTopology::default().with_small_angle_script([2, 0]);
        let summary = clean_boundaries(&mut topology, &options);
        assert_eq!(summary.iterations, 2);
        assert!(summary.converged);
        assert_eq!(
            topology.calls(),
            [
                "snap",
                "break_polygons",
                "remove_duplicates",
                "break_lines",
                "remove_duplicates",
                "clean_small_angles",
                "break_lines",
                "remove_duplicates",
                "clean_small_angles",
                "merge_boundaries",
                "remove_dangles",
                "build_areas",
                "remove_bridges",
                "build_areas",
            ]
        );
    }

    #[rstest]
    fn iteration_cap_reports_non_convergence(mut options: ImportOptions) {
        options.max_clean_iterations = Some(3);
        let mut topology = ScriptedTopology::default().with_small_angle_script([1; 10]);
        let summary = clean_boundaries(&mut topology, &options);
        assert_eq!(summary.iterations, 3);
        assert!(!summary.converged);
    }

    #[rstest]
    fn converted_lines_keep_dangles_and_bridges(mut options: ImportOptions) {
        options.types.lines_as_boundaries = true;
        let mut topology = ScriptedTopology::default();
        clean_boundaries(&mut topology, &options);
        assert!(topology.calls().contains(&"change_dangles_to_lines"));
        assert!(topology.calls().contains(&"change_bridges_to_lines"));
        assert!(!topology.calls().contains(&"snap"));
    }
}
