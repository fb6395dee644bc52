use crate::cmd::{execute, shell_quote, Cmd, CmdOutput, RunOptions};
use crate::error::CiResult;
use crate::io::Logger;
use std::path::Path;
use std::process::Command;

const SSH_OPTIONS: [&str; 4] = ["-o", "BatchMode=yes", "-o", "StrictHostKeyChecking=no"];

/// Runs command lines with `bash` on a remote server through `ssh`; files
/// are fetched with `scp`. Key-based authentication is expected.
pub struct RemoteCmd {
    host: String,
    cwd: Option<String>,
    logger: Logger,
}

impl RemoteCmd {
    pub fn new(host: &str, logger: &Logger) -> Self {
        let mut logger = logger.clone();
        logger.set_prefix(host);

        Self {
            host: host.to_string(),
            cwd: None,
            logger,
        }
    }

    /// The single argument handed to `ssh` for `line`.
    pub fn remote_line(&self, line: &str) -> String {
        let line = match &self.cwd {
            Some(cwd) => format!("cd {} && {}", cwd, line),
            None => line.to_string(),
        };
        format!("bash -c {}", shell_quote(&line))
    }

    fn resolve(&self, path: &str) -> String {
        match &self.cwd {
            Some(cwd) if !path.starts_with('/') => format!("{}/{}", cwd, path),
            _ => path.to_string(),
        }
    }
}

impl Cmd for RemoteCmd {
    fn run_with(&mut self, line: &str, options: RunOptions) -> CiResult<CmdOutput> {
        let mut command = Command::new("ssh");
        command
            .args(&SSH_OPTIONS)
            .arg(&self.host)
            .arg(self.remote_line(line));
        execute(command, line, options, &self.logger)
    }

    fn cd(&mut self, dir: &str) {
        self.cwd = Some(self.resolve(dir));
    }

    fn copyin(&mut self, src: &str, dst: &Path) -> CiResult<bool> {
        let src = format!("{}:{}", self.host, self.resolve(src));
        let mut command = Command::new("scp");
        command.args(&SSH_OPTIONS).arg(&src).arg(dst);
        let line = format!("scp {} {}", src, dst.display());
        let output = execute(command, &line, RunOptions::default(), &self.logger)?;
        if !output.success() {
            self.logger.error(format!("could not copy {}", src))?;
        }
        Ok(output.success())
    }

    fn close(&mut self) -> CiResult<()> {
        self.cwd = None;
        Ok(())
    }
}

//
// TESTS
//

#[cfg(test)]
mod tests {
    use crate::cmd::{Cmd, RemoteCmd};
    use crate::io::Logger;

    #[test]
    fn it_will_wrap_lines_for_the_remote_shell() {
        let mut cmd = RemoteCmd::new("192.168.18.197", &Logger::default());
        assert_eq!(
            cmd.remote_line("oc get pods | grep 'ran-base'"),
            r"bash -c 'oc get pods | grep '\''ran-base'\'''"
        );

        cmd.cd("/tmp/CI-eNB");
        cmd.cd("cmake_targets");
        assert_eq!(
            cmd.remote_line("ls"),
            "bash -c 'cd /tmp/CI-eNB/cmake_targets && ls'"
        );
    }
}
