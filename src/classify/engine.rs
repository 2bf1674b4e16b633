//! The classification engine: replacement lookup, rule-table pass, and
//! content-based fallback.

use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

use super::rules::{first_matching_rule, RuleContext};
use crate::metadata;
use crate::types::{
    CandidateOutcome, CandidateReport, ClassificationReport, ClassificationRequest,
    ClassificationResult,
};

/// Classifies a build's candidate modules for native ahead-of-time
/// compilation and publish filtering.
///
/// One pass is synchronous and single-threaded; candidates are evaluated in
/// input order and the outputs are order-stable. The only state shared
/// across candidates is the read-only replacement-name lookup built up
/// front.
pub struct ClassificationEngine;

impl ClassificationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Runs one classification pass and returns the two output collections.
    pub fn classify(&self, request: &ClassificationRequest) -> ClassificationResult {
        self.classify_with_report(request).into_result()
    }

    /// Runs one classification pass, keeping the per-candidate outcome and
    /// deciding rule for diagnostics. [`ClassificationReport::into_result`]
    /// yields the same collections `classify` returns.
    pub fn classify_with_report(&self, request: &ClassificationRequest) -> ClassificationReport {
        let replacement_names = Self::replacement_lookup(request);
        let ready_to_run = request.is_ready_to_run();

        let mut candidates = Vec::with_capacity(request.candidates.len());
        for path in &request.candidates {
            let (outcome, decided_by) =
                self.classify_candidate(path, request, &replacement_names, ready_to_run);
            debug!(
                path = %path.display(),
                ?outcome,
                rule = decided_by,
                "classified candidate"
            );
            candidates.push(CandidateReport {
                path: path.clone(),
                outcome,
                decided_by: decided_by.to_string(),
            });
        }

        let managed = candidates
            .iter()
            .filter(|c| c.outcome.selects_for_native_compilation())
            .count();
        let skipped = candidates
            .iter()
            .filter(|c| c.outcome.skips_publish())
            .count();
        info!(
            total = candidates.len(),
            managed, skipped, ready_to_run, "classification pass complete"
        );

        ClassificationReport { candidates }
    }

    /// Bare file names of both replacement lists, unioned. Source list and
    /// path are discarded; membership is all that matters downstream.
    fn replacement_lookup(request: &ClassificationRequest) -> HashSet<String> {
        request
            .sdk_replacements
            .iter()
            .chain(&request.framework_replacements)
            .filter_map(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect()
    }

    fn classify_candidate(
        &self,
        path: &Path,
        request: &ClassificationRequest,
        replacement_names: &HashSet<String>,
        ready_to_run: bool,
    ) -> (CandidateOutcome, &'static str) {
        // Ready-to-run recompiles everything it can; the path-based
        // exclusions only apply when compiling fully ahead of time.
        if !ready_to_run {
            let path_text = path.to_string_lossy();
            let file_name = path.file_name().map(|name| name.to_string_lossy());
            let context = RuleContext {
                path_text: &path_text,
                file_name: file_name.as_deref().unwrap_or(""),
                app_host_name: &request.app_host_name,
                host_fxr_name: &request.host_fxr_name,
                host_policy_name: &request.host_policy_name,
                replacement_names,
            };
            if let Some(rule) = first_matching_rule(&context) {
                return (CandidateOutcome::Exclude, rule.name);
            }
        }

        let module = metadata::inspect(path);
        if !module.has_metadata {
            return (CandidateOutcome::Unclassified, "not-inspectable");
        }
        if !module.is_assembly {
            return (CandidateOutcome::Unclassified, "secondary-module");
        }
        if ready_to_run {
            // The IL assembly is superseded by its recompiled form, which a
            // downstream step republishes.
            return (CandidateOutcome::CompileNative, "assembly-ready-to-run");
        }
        if module.is_neutral_culture() {
            (CandidateOutcome::CompileNative, "neutral-culture-assembly")
        } else {
            // Satellite resource assemblies stay in the publish output; the
            // AOT toolchain doesn't consume resource assemblies yet.
            (CandidateOutcome::Unclassified, "satellite-assembly")
        }
    }
}

impl Default for ClassificationEngine {
    fn default() -> Self {
        Self::new()
    }
}
