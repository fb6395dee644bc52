use crate::error::CiResult;
use crate::report::{Status, TestReport};
use chrono::Utc;
use colored::Colorize;
use std::env;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// `Logger` is used for logging to stdout and optionally to a file.
///
/// Note: `Logger` **is not** threadsafe. In most cases, if you *have* a
///       reference to a `Logger` that does not have a `log_file`, in order
///       to log to a file, clone the `Logger` then set `log_file`.
#[derive(Debug, Clone)]
pub struct Logger {
    prefix: Option<String>,
    results_dir: Option<PathBuf>,
    log_file: Option<PathBuf>,
    pub quiet: bool,
    pub verbose: bool,
}

impl Logger {
    /// Helper function for creating a simple Logger which will only print to
    /// stdout by default.
    pub fn default() -> Logger {
        Logger {
            prefix: None,
            results_dir: None,
            log_file: None,
            quiet: false,
            verbose: false,
        }
    }

    /// Helper function for creating a Logger rooted in the given run
    /// directory. Call `set_log_file` to also write into that directory.
    pub fn in_dir(results_dir: &str) -> Logger {
        let mut logger = Logger::default();
        logger.results_dir = Some(PathBuf::from(results_dir));
        logger
    }

    /// Sets the `prefix` printed in front of every stdout line, typically the
    /// node or image being worked on.
    pub fn set_prefix(&mut self, prefix: &str) {
        self.prefix = Some(prefix.to_string());
    }

    /// Returns the run directory this `Logger` writes into, if any.
    pub fn results_dir(&self) -> Option<&Path> {
        self.results_dir.as_deref()
    }

    /// Sets the path to the file to which `log` calls will write.
    ///
    /// Note: This function relies upon `results_dir` being set prior to the
    ///       call. If this `Logger` does not have a `results_dir` set prior,
    ///       it will result in a no-op.
    pub fn set_log_file(&mut self, file_name: &str) {
        if let Some(mut log_file) = self.results_dir.clone() {
            log_file.push(file_name);

            if !log_file.exists() && File::create(&log_file).is_err() {
                return;
            }
            self.log_file = Some(log_file);
        }
    }

    /// Logs output to standard out and optionally to the given file in the
    /// configured `results_dir`.
    pub fn log<T>(&self, text: T) -> CiResult<()>
    where
        T: std::fmt::Display,
    {
        self.write_lines(&text.to_string(), !self.quiet)
    }

    /// Logs output in red.
    pub fn error<T>(&self, text: T) -> CiResult<()>
    where
        T: std::fmt::Display,
    {
        self.log(text.to_string().red())
    }

    /// Diagnostic output: always written to the log file, only printed to
    /// stdout in verbose mode.
    pub fn debug<T>(&self, text: T) -> CiResult<()>
    where
        T: std::fmt::Display,
    {
        self.write_lines(
            &text.to_string().dimmed().to_string(),
            self.verbose && !self.quiet,
        )
    }

    /// Serializes and writes the given `report` to `report.json` in the root
    /// of the current run directory.
    pub fn write_report(&self, report: &TestReport) -> CiResult<()> {
        if let Some(results_dir) = &self.results_dir {
            let mut report_file = results_dir.clone();
            report_file.push("report.json");

            let mut file = File::create(report_file)?;
            file.write_all(serde_json::to_string_pretty(report)?.as_bytes())?;
            file.write_all(&[b'\n'])?;
        }

        Ok(())
    }

    fn write_lines(&self, text: &str, to_stdout: bool) -> CiResult<()> {
        for line in text.lines() {
            if !line.trim().is_empty() {
                if let Some(log_file) = &self.log_file {
                    let mut file = OpenOptions::new().append(true).open(log_file)?;
                    file.write_all(strip_ansi_escapes::strip(line.as_bytes())?.as_slice())?;
                    file.write_all(&[b'\n'])?;
                }
                if to_stdout {
                    if let Some(prefix) = &self.prefix {
                        print!("{}: ", prefix.white().bold());
                    }
                    println!("{}", line.trim_end());
                }
            }
        }
        Ok(())
    }
}

/// Gets the home directory of the CI driver: `RAN_CI_HOME` when set,
/// otherwise `~/.ran-ci`.
pub fn get_ci_home() -> Option<PathBuf> {
    if let Ok(ci_home) = env::var("RAN_CI_HOME") {
        return Some(PathBuf::from(ci_home));
    }
    dirs::home_dir().map(|mut home_dir| {
        home_dir.push(".ran-ci");
        home_dir
    })
}

/// Creates the result directory and timestamp subdirectory for this run.
pub fn create_results_dir() -> CiResult<String> {
    let result_dir = format!("results/{}", Utc::now().format("%Y%m%d%H%M%S"));
    std::fs::create_dir_all(&result_dir)?;

    Ok(result_dir)
}

/// Produces user-consumable output for the given report.
pub fn print_report_summary(report: &TestReport, logger: &Logger) -> CiResult<()> {
    let border_buffer = "=".repeat(79);
    let mid_line_buffer = "-".repeat(79);
    logger.log(&border_buffer.cyan())?;
    logger.log(format!("Test case {}", report.test_case_id).cyan())?;
    logger.log(&mid_line_buffer.cyan())?;

    for row in &report.rows {
        let status = match row.status {
            Status::Ok => "OK".green(),
            Status::Ko => "KO".red(),
        };
        logger.log(format!("{} {:30}: {:5}", "|".cyan(), row.param.cyan(), status))?;
        for message in &row.messages {
            for line in message.lines() {
                logger.log(format!("{:8}{}", "|".cyan(), line))?;
            }
        }
    }

    if !report.image_sizes.is_empty() {
        logger.log(&mid_line_buffer.cyan())?;
        for (image, size) in &report.image_sizes {
            logger.log(format!("{} {:20}: {}", "|".cyan(), image.cyan(), size))?;
        }
    }

    for (image, files) in &report.build_logs {
        for (file, analysis) in files {
            let status = if analysis.status {
                "PASS".green()
            } else {
                "FAIL".red()
            };
            logger.log(format!(
                "{:8}{:13}: {:5} - {} error(s), {} warning(s)",
                "|".cyan(),
                format!("{}/{}", image, file).cyan(),
                status,
                analysis.errors,
                analysis.warnings
            ))?;
        }
    }
    logger.log(format!("{}{}", &border_buffer.cyan(), "".clear()))?;

    Ok(())
}

//
// TESTS
//

#[cfg(test)]
mod tests {
    use crate::io::Logger;
    use crate::report::{Status, TestReport};

    #[test]
    fn it_will_write_stripped_lines_to_the_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = Logger::in_dir(dir.path().to_str().unwrap());
        logger.quiet = true;
        logger.set_log_file("ci.log");

        logger.error("login failed").unwrap();
        logger.debug("> oc project oaicicd-ran").unwrap();
        logger.log("\n   \n").unwrap();

        let contents = std::fs::read_to_string(dir.path().join("ci.log")).unwrap();
        assert_eq!(contents, "login failed\n> oc project oaicicd-ran\n");
    }

    #[test]
    fn it_will_not_write_without_a_results_dir() {
        let mut logger = Logger::default();
        logger.set_prefix("node");
        logger.quiet = true;
        logger.set_log_file("ci.log");

        assert!(logger.results_dir().is_none());
        logger.log("nothing to see").unwrap();
    }

    #[test]
    fn it_can_write_a_report() {
        let dir = tempfile::tempdir().unwrap();
        let logger = Logger::in_dir(dir.path().to_str().unwrap());
        let mut report = TestReport::new("010101");
        report.add_row("all", Status::Ok, "all processes OK");

        logger.write_report(&report).unwrap();

        let contents = std::fs::read_to_string(dir.path().join("report.json")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(json["test_case_id"], "010101");
        assert_eq!(json["rows"][0]["status"], "OK");
    }
}
