//! Coarse progress notifications
//!
//! Progress is fire-and-forget: the exporter calls the callback at fixed
//! checkpoints and never looks at what it does.

/// Checkpoints of an export run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportPhase {
    /// Export started
    Start,
    /// Bind-pose skeleton encoded
    Skeleton,
    /// Triangles pooled
    Mesh,
    /// Materials encoded
    Materials,
    /// Actions sampled
    Actions,
    /// Output buffer finished
    End,
}

impl ExportPhase {
    /// Completion percentage reached at this checkpoint
    pub fn percent(&self) -> u8 {
        match self {
            ExportPhase::Start => 0,
            ExportPhase::Skeleton => 20,
            ExportPhase::Mesh => 40,
            ExportPhase::Materials => 60,
            ExportPhase::Actions => 75,
            ExportPhase::End => 100,
        }
    }
}

/// Progress information passed to the callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportProgress {
    pub phase: ExportPhase,
    pub percent: u8,
}

impl From<ExportPhase> for ExportProgress {
    fn from(phase: ExportPhase) -> Self {
        Self {
            phase,
            percent: phase.percent(),
        }
    }
}

/// Progress callback for export runs
pub type ProgressCallback = Box<dyn Fn(ExportProgress) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_percentages_increase() {
        let phases = [
            ExportPhase::Start,
            ExportPhase::Skeleton,
            ExportPhase::Mesh,
            ExportPhase::Materials,
            ExportPhase::Actions,
            ExportPhase::End,
        ];
        assert!(phases.windows(2).all(|w| w[0].percent() < w[1].percent()));
        assert_eq!(ExportProgress::from(ExportPhase::End).percent, 100);
    }
}
