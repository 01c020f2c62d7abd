//! Step encoding: `NAME[+ARG]...`.
//!
//! The dispatch key is everything before the first `+` (case-sensitive);
//! the remaining tokens are arguments. Steps are parsed once when an agent is
//! built or loaded. The raw text is kept alongside the typed form so
//! re-serializing a step always reproduces the original encoding.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::FlowError;

pub const START: &str = "START";
pub const ANSWER: &str = "ANSWER";
pub const BECOME: &str = "BECOME";
pub const BECOME_ONCE: &str = "BECOME*";
pub const FETCH_DATA: &str = "FETCH_DATA";
pub const FETCH_DATA_ONCE: &str = "FETCH_DATA*";
pub const REDIRECT: &str = "REDIRECT";
pub const MCP: &str = "MCP";
pub const CLEANUP: &str = "CLEANUP";

const USE_MEMORY: &str = "USE_MEMORY";
const USE_KNOWLEDGE: &str = "USE_KNOWLEDGE";
const AS_SYSTEM: &str = "AS_SYSTEM";

/// What the caller does with a redirect reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputMode {
    /// Fold the reply into the chat as a message.
    AsOutput,
    /// Stash the reply content as the chat's data filter.
    AsFilter,
}

impl OutputMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AsOutput => "AS_Output",
            Self::AsFilter => "AS_Filter",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "AS_Output" => Some(Self::AsOutput),
            "AS_Filter" => Some(Self::AsFilter),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeMode {
    Append,
    /// Replace the caller's last message with the reply.
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grounding {
    None,
    Memory,
    Knowledge,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepKind {
    Start,
    Answer {
        grounding: Grounding,
    },
    Become {
        role: String,
        once: bool,
    },
    FetchData {
        as_system: bool,
        once: bool,
    },
    Redirect {
        target: String,
        output: OutputMode,
        merge: MergeMode,
    },
    Mcp,
    Cleanup,
}

/// A parsed step: its typed meaning plus the exact text it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    raw: String,
    kind: StepKind,
}

impl Step {
    pub fn parse(raw: &str) -> Result<Self, FlowError> {
        let mut tokens = raw.split('+');
        let key = tokens.next().unwrap_or_default();
        let args: Vec<&str> = tokens.collect();

        if key.is_empty() {
            return Err(FlowError::invalid_step(raw, "empty step name"));
        }
        if args.iter().any(|a| a.is_empty()) {
            return Err(FlowError::invalid_step(raw, "empty argument"));
        }

        let kind = match key {
            START => {
                no_args(raw, &args)?;
                StepKind::Start
            }
            MCP => {
                no_args(raw, &args)?;
                StepKind::Mcp
            }
            CLEANUP => {
                no_args(raw, &args)?;
                StepKind::Cleanup
            }
            ANSWER => {
                let grounding = match args.as_slice() {
                    [] => Grounding::None,
                    [USE_MEMORY] => Grounding::Memory,
                    [USE_KNOWLEDGE] => Grounding::Knowledge,
                    _ => {
                        return Err(FlowError::invalid_step(
                            raw,
                            "ANSWER accepts a single USE_MEMORY or USE_KNOWLEDGE modifier",
                        ))
                    }
                };
                StepKind::Answer { grounding }
            }
            BECOME | BECOME_ONCE => match args.as_slice() {
                [role] => StepKind::Become {
                    role: role.to_string(),
                    once: key == BECOME_ONCE,
                },
                _ => return Err(FlowError::invalid_step(raw, "BECOME needs exactly one role")),
            },
            FETCH_DATA | FETCH_DATA_ONCE => {
                let as_system = match args.as_slice() {
                    [] => false,
                    [AS_SYSTEM] => true,
                    _ => {
                        return Err(FlowError::invalid_step(
                            raw,
                            "FETCH_DATA accepts only the AS_SYSTEM modifier",
                        ))
                    }
                };
                StepKind::FetchData {
                    as_system,
                    once: key == FETCH_DATA_ONCE,
                }
            }
            REDIRECT => parse_redirect(raw, &args)?,
            other => {
                return Err(FlowError::invalid_step(
                    raw,
                    format!("unknown step name '{}'", other),
                ))
            }
        };

        Ok(Self {
            raw: raw.to_string(),
            kind,
        })
    }

    /// Parse a whole step list, failing on the first bad entry.
    pub fn parse_all<S: AsRef<str>>(steps: &[S]) -> Result<Vec<Self>, FlowError> {
        steps.iter().map(|s| Self::parse(s.as_ref())).collect()
    }

    /// Dispatch key: the text before the first `+`.
    pub fn key(&self) -> &str {
        self.raw.split('+').next().unwrap_or_default()
    }

    pub fn kind(&self) -> &StepKind {
        &self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn no_args(raw: &str, args: &[&str]) -> Result<(), FlowError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(FlowError::invalid_step(raw, "step takes no arguments"))
    }
}

fn parse_redirect(raw: &str, args: &[&str]) -> Result<StepKind, FlowError> {
    let (target, rest) = match args.split_first() {
        Some((target, rest)) => (target.to_string(), rest),
        None => return Err(FlowError::invalid_step(raw, "REDIRECT needs a target agent id")),
    };

    let output = match rest.first() {
        None => OutputMode::AsOutput,
        Some(mode) => OutputMode::from_str(mode).ok_or_else(|| {
            FlowError::invalid_step(raw, format!("unknown output mode '{}'", mode))
        })?,
    };

    let merge = match rest.get(1) {
        None => MergeMode::Append,
        Some(&"REPLACE") => MergeMode::Replace,
        Some(other) => {
            return Err(FlowError::invalid_step(
                raw,
                format!("unknown merge mode '{}'", other),
            ))
        }
    };

    if rest.len() > 2 {
        return Err(FlowError::invalid_step(raw, "too many REDIRECT arguments"));
    }

    Ok(StepKind::Redirect {
        target,
        output,
        merge,
    })
}

/// Fluent construction of step lists.
#[derive(Debug, Default, Clone)]
pub struct StepBuilder {
    steps: Vec<String>,
}

impl StepBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(mut self) -> Self {
        self.steps.push(START.to_string());
        self
    }

    pub fn answer(mut self) -> Self {
        self.steps.push(ANSWER.to_string());
        self
    }

    pub fn answer_use_memory(mut self) -> Self {
        self.steps.push(format!("{}+{}", ANSWER, USE_MEMORY));
        self
    }

    pub fn answer_use_knowledge(mut self) -> Self {
        self.steps.push(format!("{}+{}", ANSWER, USE_KNOWLEDGE));
        self
    }

    pub fn become_(mut self, role: &str) -> Self {
        self.steps.push(format!("{}+{}", BECOME, role));
        self
    }

    pub fn fetch_data(mut self) -> Self {
        self.steps.push(FETCH_DATA.to_string());
        self
    }

    pub fn fetch_data_as_system(mut self) -> Self {
        self.steps.push(format!("{}+{}", FETCH_DATA, AS_SYSTEM));
        self
    }

    /// An empty `mode` means append.
    pub fn redirect(mut self, agent_id: &str, output: &str, mode: &str) -> Self {
        let step = if mode.is_empty() {
            format!("{}+{}+{}", REDIRECT, agent_id, output)
        } else {
            format!("{}+{}+{}+{}", REDIRECT, agent_id, output, mode)
        };
        self.steps.push(step);
        self
    }

    pub fn mcp(mut self) -> Self {
        self.steps.push(MCP.to_string());
        self
    }

    pub fn cleanup(mut self) -> Self {
        self.steps.push(CLEANUP.to_string());
        self
    }

    pub fn build(self) -> Vec<String> {
        self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_documented_encodings() {
        let cases = [
            ("START", StepKind::Start),
            (
                "ANSWER",
                StepKind::Answer {
                    grounding: Grounding::None,
                },
            ),
            (
                "ANSWER+USE_MEMORY",
                StepKind::Answer {
                    grounding: Grounding::Memory,
                },
            ),
            (
                "BECOME+Pirate",
                StepKind::Become {
                    role: "Pirate".into(),
                    once: false,
                },
            ),
            (
                "FETCH_DATA+AS_SYSTEM",
                StepKind::FetchData {
                    as_system: true,
                    once: false,
                },
            ),
            (
                "FETCH_DATA*",
                StepKind::FetchData {
                    as_system: false,
                    once: true,
                },
            ),
            (
                "REDIRECT+agent-7+AS_Filter+REPLACE",
                StepKind::Redirect {
                    target: "agent-7".into(),
                    output: OutputMode::AsFilter,
                    merge: MergeMode::Replace,
                },
            ),
            ("MCP", StepKind::Mcp),
        ];

        for (raw, kind) in cases {
            let step = Step::parse(raw).unwrap();
            assert_eq!(step.kind(), &kind, "{}", raw);
            assert_eq!(step.to_string(), raw);
        }
    }

    #[test]
    fn key_is_text_before_first_plus() {
        let step = Step::parse("REDIRECT+b+AS_Output").unwrap();
        assert_eq!(step.key(), "REDIRECT");
        assert_eq!(Step::parse("FETCH_DATA*").unwrap().key(), "FETCH_DATA*");
    }

    #[test]
    fn redirect_defaults_to_output_and_append() {
        let step = Step::parse("REDIRECT+b").unwrap();
        assert_eq!(
            step.kind(),
            &StepKind::Redirect {
                target: "b".into(),
                output: OutputMode::AsOutput,
                merge: MergeMode::Append,
            }
        );
    }

    #[test]
    fn rejects_bad_encodings() {
        for raw in [
            "",
            "answer",
            "ANSWER+USE_EVERYTHING",
            "BECOME",
            "REDIRECT",
            "REDIRECT+b+AS_Whatever",
            "REDIRECT+b+AS_Output+MERGE",
            "START+NOW",
            "ANSWER++USE_MEMORY",
        ] {
            let err = Step::parse(raw).unwrap_err();
            assert!(matches!(err, FlowError::InvalidStep { .. }), "{}", raw);
        }
    }

    #[test]
    fn builder_round_trips_through_parser() {
        let steps = StepBuilder::new()
            .answer()
            .answer_use_memory()
            .become_("Critic")
            .fetch_data()
            .redirect("x", "AS_Output", "REPLACE")
            .build();
        assert_eq!(
            steps,
            vec![
                "ANSWER",
                "ANSWER+USE_MEMORY",
                "BECOME+Critic",
                "FETCH_DATA",
                "REDIRECT+x+AS_Output+REPLACE"
            ]
        );
        let parsed = Step::parse_all(&steps).unwrap();
        let encoded: Vec<String> = parsed.iter().map(|s| s.to_string()).collect();
        assert_eq!(encoded, steps);
    }
}
