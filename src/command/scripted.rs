//! In-memory runner for unit tests: records invocations and replays canned results

use std::{collections::VecDeque, sync::Mutex};
use async_trait::async_trait;

use super::{CommandResult, CommandRunner, CommandSpec};
use crate::error::CommandError;

type Reply = Box<dyn Fn() -> Result<CommandResult, CommandError> + Send + Sync>;

struct Rule {
    prefix: Vec<String>,
    replies: VecDeque<Reply>,
    /// Used once `replies` is drained
    fallback: Option<Reply>,
}

/// Matches invocations by program + argument prefix.
///
/// Unmatched invocations succeed with empty output.
#[derive(Default)]
pub(crate) struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn rule_mut<R>(&self, prefix: &[&str], f: impl FnOnce(&mut Rule) -> R) -> R {
        let prefix: Vec<String> = prefix.iter().map(|s| s.to_string()).collect();
        let mut rules = self.rules.lock().unwrap();
        if let Some(rule) = rules.iter_mut().find(|r| r.prefix == prefix) {
            return f(rule);
        }
        rules.push(Rule {
            prefix,
            replies: VecDeque::new(),
            fallback: None,
        });
        f(rules.last_mut().unwrap())
    }

    /// Queue a one-shot stdout reply (exit 0)
    pub(crate) fn reply(&self, prefix: &[&str], stdout: &str) -> &Self {
        let stdout = stdout.to_string();
        self.reply_with(prefix, move || Ok(CommandResult::exited(0, stdout.clone(), "")))
    }

    pub(crate) fn reply_with(
        &self,
        prefix: &[&str],
        reply: impl Fn() -> Result<CommandResult, CommandError> + Send + Sync + 'static,
    ) -> &Self {
        self.rule_mut(prefix, |rule| rule.replies.push_back(Box::new(reply)));
        self
    }

    /// Reply used for every call once queued replies run out
    pub(crate) fn always(&self, prefix: &[&str], stdout: &str) -> &Self {
        let stdout = stdout.to_string();
        self.always_with(prefix, move || Ok(CommandResult::exited(0, stdout.clone(), "")))
    }

    pub(crate) fn always_with(
        &self,
        prefix: &[&str],
        reply: impl Fn() -> Result<CommandResult, CommandError> + Send + Sync + 'static,
    ) -> &Self {
        self.rule_mut(prefix, |rule| rule.fallback = Some(Box::new(reply)));
        self
    }

    pub(crate) fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls whose program + args start with `prefix`
    pub(crate) fn count(&self, prefix: &[&str]) -> usize {
        self.calls()
            .iter()
            .filter(|spec| matches_prefix(spec, prefix))
            .count()
    }
}

fn matches_prefix<S: AsRef<str>>(spec: &CommandSpec, prefix: &[S]) -> bool {
    let mut words = std::iter::once(spec.program.as_str()).chain(spec.args.iter().map(String::as_str));
    prefix.iter().all(|p| words.next() == Some(p.as_ref()))
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandResult, CommandError> {
        self.calls.lock().unwrap().push(spec.clone());

        let mut rules = self.rules.lock().unwrap();
        // Longest matching prefix wins
        let rule = rules
            .iter_mut()
            .filter(|r| matches_prefix(spec, &r.prefix[..]))
            .max_by_key(|r| r.prefix.len());
        match rule {
            Some(rule) => {
                if let Some(reply) = rule.replies.pop_front() {
                    return reply();
                }
                match &rule.fallback {
                    Some(reply) => reply(),
                    None => Ok(CommandResult::exited(0, "", "")),
                }
            }
            None => Ok(CommandResult::exited(0, "", "")),
        }
    }
}
