use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Compilation-mode literal that selects ready-to-run classification.
/// Matched case-insensitively; any other value (or none) selects the
/// standard ahead-of-time path.
pub const READY_TO_RUN_MODE: &str = "readytorun";

/// Inputs for one classification pass, supplied by the surrounding build
/// orchestration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRequest {
    /// Candidate module paths, in the order the build produced them.
    pub candidates: Vec<PathBuf>,
    /// Modules whose bare file names shadow SDK-supplied candidates.
    pub sdk_replacements: Vec<PathBuf>,
    /// Modules whose bare file names shadow framework-supplied candidates.
    pub framework_replacements: Vec<PathBuf>,
    /// File name of the native application-host executable.
    pub app_host_name: String,
    /// Name of the host-resolver library.
    pub host_fxr_name: String,
    /// Name of the host-policy library.
    pub host_policy_name: String,
    /// Optional mode selector; see [`READY_TO_RUN_MODE`].
    pub compilation_mode: Option<String>,
}

impl ClassificationRequest {
    pub fn is_ready_to_run(&self) -> bool {
        self.compilation_mode
            .as_deref()
            .is_some_and(|mode| mode.eq_ignore_ascii_case(READY_TO_RUN_MODE))
    }
}

/// Per-candidate classification outcome. The two output collections are
/// projections of this tag, so a candidate selected for native compilation
/// is always also skipped from the publish output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateOutcome {
    /// Left alone: neither compiled natively nor removed from publish output.
    Unclassified,
    /// Removed from the publish output only.
    Exclude,
    /// Handed to the native compiler and removed from the publish output.
    CompileNative,
}

impl CandidateOutcome {
    pub fn selects_for_native_compilation(self) -> bool {
        matches!(self, CandidateOutcome::CompileNative)
    }

    pub fn skips_publish(self) -> bool {
        matches!(
            self,
            CandidateOutcome::Exclude | CandidateOutcome::CompileNative
        )
    }
}

/// One candidate's outcome plus the rule that decided it, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateReport {
    pub path: PathBuf,
    pub outcome: CandidateOutcome,
    /// Name of the exclusion rule or content check that produced the outcome.
    pub decided_by: String,
}

/// Full per-candidate record of a classification pass, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub candidates: Vec<CandidateReport>,
}

impl ClassificationReport {
    /// Projects the per-candidate outcomes into the two output collections.
    pub fn into_result(self) -> ClassificationResult {
        let mut result = ClassificationResult::default();
        for candidate in self.candidates {
            if candidate.outcome.selects_for_native_compilation() {
                result.managed_assemblies.push(candidate.path.clone());
            }
            if candidate.outcome.skips_publish() {
                result.assemblies_to_skip_publish.push(candidate.path);
            }
        }
        result
    }
}

/// The two output collections. Overlapping, not exhaustive: every entry of
/// `managed_assemblies` also appears in `assemblies_to_skip_publish`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Candidates selected for native ahead-of-time compilation.
    pub managed_assemblies: Vec<PathBuf>,
    /// Candidates to omit from the publish output directory.
    pub assemblies_to_skip_publish: Vec<PathBuf>,
}
