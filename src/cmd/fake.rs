use crate::cmd::{Cmd, CmdOutput, RunOptions};
use crate::error::CiResult;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// Command runner answering with canned outputs. A command line gets the
/// reply of the longest registered pattern it contains; repeated `on` calls
/// for the same pattern are replayed in order, the last reply sticks.
/// Unmatched lines succeed with empty output. Copies succeed unless
/// `failing_copies` was set.
#[derive(Default)]
pub struct ScriptedCmd {
    rules: Vec<(String, VecDeque<CmdOutput>)>,
    pub commands: Vec<String>,
    pub copied: Vec<(String, PathBuf)>,
    pub cwd: Option<String>,
    pub closed: bool,
    fail_copies: bool,
}

impl ScriptedCmd {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, pattern: &str, returncode: i32, stdout: &str) -> Self {
        let reply = CmdOutput {
            returncode,
            stdout: stdout.to_string(),
        };
        match self.rules.iter_mut().find(|(p, _)| p == pattern) {
            Some((_, replies)) => replies.push_back(reply),
            None => self
                .rules
                .push((pattern.to_string(), VecDeque::from(vec![reply]))),
        }
        self
    }

    pub fn failing_copies(mut self) -> Self {
        self.fail_copies = true;
        self
    }

    pub fn ran(&self, needle: &str) -> bool {
        self.count(needle) > 0
    }

    pub fn count(&self, needle: &str) -> usize {
        self.commands.iter().filter(|c| c.contains(needle)).count()
    }

    /// Index of the first command containing `needle`.
    pub fn position(&self, needle: &str) -> Option<usize> {
        self.commands.iter().position(|c| c.contains(needle))
    }
}

impl Cmd for ScriptedCmd {
    fn run_with(&mut self, line: &str, _options: RunOptions) -> CiResult<CmdOutput> {
        self.commands.push(line.to_string());
        let rule = self
            .rules
            .iter_mut()
            .filter(|(pattern, _)| line.contains(pattern.as_str()))
            .max_by_key(|(pattern, _)| pattern.len());
        let output = match rule {
            Some((_, replies)) if replies.len() > 1 => replies.pop_front().unwrap_or_default(),
            Some((_, replies)) => replies.front().cloned().unwrap_or_default(),
            None => CmdOutput::default(),
        };
        Ok(output)
    }

    fn cd(&mut self, dir: &str) {
        self.cwd = Some(dir.to_string());
    }

    fn copyin(&mut self, src: &str, dst: &Path) -> CiResult<bool> {
        self.copied.push((src.to_string(), dst.to_path_buf()));
        Ok(!self.fail_copies)
    }

    fn close(&mut self) -> CiResult<()> {
        self.closed = true;
        Ok(())
    }
}
