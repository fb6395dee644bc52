use crate::cmd::{execute, Cmd, CmdOutput, RunOptions};
use crate::error::CiResult;
use crate::io::Logger;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Runs command lines with `bash` on this machine.
pub struct LocalCmd {
    cwd: Option<PathBuf>,
    logger: Logger,
}

impl LocalCmd {
    pub fn new(logger: &Logger) -> Self {
        Self {
            cwd: None,
            logger: logger.clone(),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        match &self.cwd {
            Some(cwd) => cwd.join(path),
            None => PathBuf::from(path),
        }
    }
}

impl Cmd for LocalCmd {
    fn run_with(&mut self, line: &str, options: RunOptions) -> CiResult<CmdOutput> {
        let mut command = Command::new("bash");
        command.arg("-c").arg(line);
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        execute(command, line, options, &self.logger)
    }

    fn cd(&mut self, dir: &str) {
        self.cwd = Some(self.resolve(dir));
    }

    fn copyin(&mut self, src: &str, dst: &Path) -> CiResult<bool> {
        let src = self.resolve(src);
        if src == dst {
            return Ok(true);
        }
        match std::fs::copy(&src, dst) {
            Ok(_) => Ok(true),
            Err(e) => {
                self.logger
                    .error(format!("could not copy {}: {}", src.display(), e))?;
                Ok(false)
            }
        }
    }

    fn close(&mut self) -> CiResult<()> {
        Ok(())
    }
}

//
// TESTS
//

#[cfg(test)]
mod tests {
    use crate::cmd::{Cmd, LocalCmd};
    use crate::io::Logger;

    #[test]
    fn it_can_copy_relative_to_the_working_directory() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("build.log"), "done\n").unwrap();

        let mut logger = Logger::default();
        logger.quiet = true;
        let mut cmd = LocalCmd::new(&logger);
        cmd.cd(src.path().to_str().unwrap());

        let target = dst.path().join("build.log");
        assert!(cmd.copyin("build.log", &target).unwrap());
        assert_eq!(std::fs::read_to_string(target).unwrap(), "done\n");
        assert!(!cmd.copyin("missing.log", &dst.path().join("x")).unwrap());
    }
}
