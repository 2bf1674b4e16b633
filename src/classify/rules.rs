//! Path-based exclusion rules applied before any binary inspection.
//!
//! The rules form an explicit ordered table; the first match wins and the
//! candidate is excluded from the publish output without opening the file.
//! In ready-to-run mode the whole table is bypassed. Rule order is a
//! documented contract, not accidental control flow.

use std::collections::HashSet;

/// Package-name marker identifying the shared managed runtime tree. A
/// literal-substring heuristic kept for compatibility; isolated in
/// [`in_native_runtime_tree`] so it can be swapped for a structural check
/// without touching the rule table.
pub const SHARED_RUNTIME_PACKAGE_MARKER: &str = "Microsoft.NETCore.App";

/// Everything a rule may look at for one candidate. Path text is the lossy
/// string form of the candidate path; comparisons are textual on purpose,
/// matching how the surrounding build pipeline names these files.
pub struct RuleContext<'a> {
    pub path_text: &'a str,
    pub file_name: &'a str,
    pub app_host_name: &'a str,
    pub host_fxr_name: &'a str,
    pub host_policy_name: &'a str,
    pub replacement_names: &'a HashSet<String>,
}

/// One entry of the exclusion rule table.
pub struct ExclusionRule {
    pub name: &'static str,
    pub applies: fn(&RuleContext) -> bool,
}

/// The ordered rule table. Cheap path checks run before anything that would
/// require parsing the candidate's binary content.
pub const EXCLUSION_RULES: &[ExclusionRule] = &[
    ExclusionRule {
        name: "host-binary",
        applies: is_host_binary,
    },
    ExclusionRule {
        name: "native-runtime-tree",
        applies: in_native_runtime_tree,
    },
    ExclusionRule {
        name: "replacement-shadowing",
        applies: shadowed_by_replacement,
    },
];

/// Returns the first rule in table order that matches the candidate.
pub fn first_matching_rule(context: &RuleContext) -> Option<&'static ExclusionRule> {
    EXCLUSION_RULES.iter().find(|rule| (rule.applies)(context))
}

/// The native application host and the host resolver/policy libraries are
/// never publish candidates when compiling ahead of time.
fn is_host_binary(context: &RuleContext) -> bool {
    ends_with_ignore_ascii_case(context.path_text, context.app_host_name)
        || context.path_text.contains(context.host_fxr_name)
        || context.path_text.contains(context.host_policy_name)
}

/// Native artifacts shipped under the shared runtime package's `native`
/// subtree, in either path-separator style.
fn in_native_runtime_tree(context: &RuleContext) -> bool {
    context.path_text.contains(SHARED_RUNTIME_PACKAGE_MARKER)
        && (context.path_text.contains("\\native\\") || context.path_text.contains("/native/"))
}

/// Candidates superseded by a same-named module bundled with the native
/// compilation toolchain.
fn shadowed_by_replacement(context: &RuleContext) -> bool {
    context.replacement_names.contains(context.file_name)
}

fn ends_with_ignore_ascii_case(text: &str, suffix: &str) -> bool {
    let text = text.as_bytes();
    let suffix = suffix.as_bytes();
    text.len() >= suffix.len() && text[text.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}
