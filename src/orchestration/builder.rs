//! Problem decomposition into a validated task graph.
//!
//! The builder turns a problem statement into tasks using a fixed,
//! deterministic grammar — no language understanding happens here.
//! Bullet or numbered lines each become one task; bracketed markers
//! declare data flow and explicit ordering:
//!
//! ```text
//! - locate the auth modules [provides: auth-files] => list of auth file paths
//! - analyze the auth flow [needs: auth-files] => report describing the flow
//! - harden session handling [after: analyze-the-auth-flow]
//! ```
//!
//! A task B depends on a task A when B `needs` an artifact A `provides`,
//! or when B names A in an `after:` marker. Line order alone implies
//! nothing. A problem with no bullet lines falls back to a fixed
//! five-phase breakdown.

use crate::core::{Capability, Task, TaskGraph};
use crate::error::{Error, Result};
use crate::project::ContextHints;
use crate::stlog_debug;
use regex::Regex;
use std::collections::HashMap;

/// Priority-ordered capability rules: the first rule with any keyword
/// present in the task description wins; the fallback is `General`.
const CAPABILITY_RULES: &[(Capability, &[&str])] = &[
    (
        Capability::Locate,
        &["find", "locate", "search", "discover", "enumerate", "list"],
    ),
    (
        Capability::Analyze,
        &[
            "analyze",
            "inspect",
            "review",
            "trace",
            "audit",
            "investigate",
            "understand",
            "profile",
        ],
    ),
    (
        Capability::Research,
        &["research", "compare", "evaluate", "benchmark", "survey"],
    ),
    (
        Capability::Synthesize,
        &[
            "synthesize",
            "summarize",
            "combine",
            "compose",
            "document",
            "draft",
            "report",
        ],
    ),
];

/// Pick the capability for a task description via the fixed rule table.
pub fn capability_for(description: &str) -> Capability {
    let lower = description.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    for (capability, keywords) in CAPABILITY_RULES {
        if keywords.iter().any(|k| words.contains(k)) {
            return *capability;
        }
    }
    Capability::General
}

/// One parsed sub-task before dependency resolution.
#[derive(Debug, Clone)]
struct TaskSpec {
    name: String,
    description: String,
    criterion: Option<String>,
    provides: Vec<String>,
    needs: Vec<String>,
    after: Vec<String>,
}

/// Builds a validated [`TaskGraph`] from a problem statement.
pub struct TaskGraphBuilder {
    bullet: Regex,
    marker: Regex,
}

impl TaskGraphBuilder {
    pub fn new() -> Self {
        Self {
            bullet: Regex::new(r"^\s*(?:[-*]|\d+[.)])\s+(.+)$").expect("valid bullet regex"),
            marker: Regex::new(r"\[(provides|needs|after)\s*:\s*([^\]]*)\]")
                .expect("valid marker regex"),
        }
    }

    /// Decompose a problem statement into a validated task graph.
    ///
    /// # Errors
    /// Returns `Error::Cycle` (naming every task on a cycle) if the
    /// declared dependencies are circular, or `Error::Validation` for
    /// duplicate names, unknown `after:` references, or a `needs:`
    /// label no task provides. No partial graph is ever returned.
    pub fn decompose(&self, problem: &str, hints: &ContextHints) -> Result<TaskGraph> {
        let specs = self.parse_specs(problem, hints);
        stlog_debug!("TaskGraphBuilder::decompose specs={}", specs.len());

        let mut tasks: Vec<Task> = specs
            .iter()
            .map(|spec| {
                let mut task = Task::new(
                    &spec.name,
                    &spec.description,
                    capability_for(&spec.description),
                );
                if let Some(criterion) = &spec.criterion {
                    task = task.with_success_criterion(criterion);
                }
                task
            })
            .collect();

        let ids: HashMap<&str, crate::core::TaskId> = specs
            .iter()
            .zip(tasks.iter())
            .map(|(spec, task)| (spec.name.as_str(), task.id))
            .collect();
        if ids.len() != specs.len() {
            return Err(Error::Validation(duplicate_name(&specs)));
        }

        // Providers of each artifact label, in creation order.
        let mut providers: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, spec) in specs.iter().enumerate() {
            for label in &spec.provides {
                providers.entry(label.as_str()).or_default().push(i);
            }
        }

        for (i, spec) in specs.iter().enumerate() {
            let mut deps = Vec::new();

            for name in &spec.after {
                let Some(&id) = ids.get(name.as_str()) else {
                    return Err(Error::Validation(format!(
                        "unknown task '{}' in after: marker of '{}'",
                        name, spec.name
                    )));
                };
                deps.push(id);
            }

            for label in &spec.needs {
                let sources: Vec<usize> = providers
                    .get(label.as_str())
                    .into_iter()
                    .flatten()
                    .copied()
                    .filter(|&p| p != i)
                    .collect();
                if sources.is_empty() {
                    return Err(Error::Validation(format!(
                        "no task provides '{}' needed by '{}'",
                        label, spec.name
                    )));
                }
                for p in sources {
                    deps.push(tasks[p].id);
                }
            }

            let task = &mut tasks[i];
            for dep in deps {
                if !task.depends_on.contains(&dep) {
                    task.depends_on.push(dep);
                }
            }
        }

        let graph = TaskGraph::from_tasks(tasks)?;
        graph.validate()?;
        Ok(graph)
    }

    /// Split the problem text into task specs.
    fn parse_specs(&self, problem: &str, hints: &ContextHints) -> Vec<TaskSpec> {
        let mut specs = Vec::new();
        for line in problem.lines() {
            let Some(caps) = self.bullet.captures(line) else {
                continue;
            };
            specs.push(self.parse_line(&caps[1]));
        }
        if specs.is_empty() {
            return fallback_specs(problem, hints);
        }
        specs
    }

    /// Parse one bullet line into a spec.
    fn parse_line(&self, line: &str) -> TaskSpec {
        let mut provides = Vec::new();
        let mut needs = Vec::new();
        let mut after = Vec::new();

        for caps in self.marker.captures_iter(line) {
            let values = caps[2]
                .split(',')
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty());
            match &caps[1] {
                "provides" => provides.extend(values),
                "needs" => needs.extend(values),
                "after" => after.extend(values),
                _ => {}
            }
        }

        let cleaned = self.marker.replace_all(line, "");
        let (description, criterion) = match cleaned.split_once("=>") {
            Some((desc, crit)) => (collapse_spaces(desc), Some(collapse_spaces(crit))),
            None => (collapse_spaces(&cleaned), None),
        };

        TaskSpec {
            name: slug(&description),
            description,
            criterion: criterion.filter(|c| !c.is_empty()),
            provides,
            needs,
            after,
        }
    }
}

impl Default for TaskGraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed five-phase breakdown for free-form problems without bullets.
fn fallback_specs(problem: &str, hints: &ContextHints) -> Vec<TaskSpec> {
    let problem = collapse_spaces(problem);
    let analyze_description = if hints.files.is_empty() {
        format!("Analyze requirements for: {}", problem)
    } else {
        format!(
            "Analyze requirements for: {} across {} known project files",
            problem,
            hints.files.len()
        )
    };

    let phases: [(&str, String); 5] = [
        ("analyze-requirements", analyze_description),
        (
            "design-solution",
            format!("Design a solution architecture for: {}", problem),
        ),
        (
            "implement-core",
            "Implement the core functionality".to_string(),
        ),
        ("write-tests", "Write comprehensive tests".to_string()),
        (
            "review-and-optimize",
            "Review and optimize the result".to_string(),
        ),
    ];

    let mut specs = Vec::with_capacity(phases.len());
    let mut previous: Option<String> = None;
    for (name, description) in phases {
        specs.push(TaskSpec {
            name: name.to_string(),
            description,
            criterion: None,
            provides: Vec::new(),
            needs: Vec::new(),
            after: previous.iter().cloned().collect(),
        });
        previous = Some(name.to_string());
    }
    specs
}

/// Derive a short unique-ish name from a description: the first four
/// words, lowercased and hyphen-joined.
fn slug(description: &str) -> String {
    description
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .take(4)
        .collect::<Vec<_>>()
        .join("-")
}

fn collapse_spaces(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn duplicate_name(specs: &[TaskSpec]) -> String {
    let mut seen = std::collections::HashSet::new();
    for spec in specs {
        if !seen.insert(&spec.name) {
            return format!("duplicate task name '{}'", spec.name);
        }
    }
    "duplicate task name".to_string()
}
