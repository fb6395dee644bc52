use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

pub const OC_LOGIN_FAIL: &str = "OC cluster login failed";
pub const OC_PROJECT_FAIL: &str = "OC project access or deployment failed";
pub const ALL_PROCESSES_OK: &str = "all processes OK";

#[derive(Serialize, Clone, Copy, Debug, PartialEq)]
pub enum Status {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "KO")]
    Ko,
}
impl Status {
    pub fn from_bool(passed: bool) -> Self {
        if passed {
            Status::Ok
        } else {
            Status::Ko
        }
    }
}

/// One line of the test report.
#[derive(Serialize, Clone, Debug)]
pub struct TestRow {
    pub param: String,
    pub status: Status,
    pub messages: Vec<String>,
}

/// Error and warning counts of a single build log file.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct LogAnalysis {
    pub errors: usize,
    pub warnings: usize,
    pub status: bool,
}

/// Per image, per log file analysis, e.g.
/// `{ "oai-gnb": { "oai-gnb.log": { ... } } }`
pub type BuildLogAnalysis = BTreeMap<String, BTreeMap<String, LogAnalysis>>;

#[derive(Serialize, Clone, Debug, Default)]
pub struct TestReport {
    pub uuid: String,
    pub test_case_id: String,
    pub start_time: u128,
    pub completion_time: u128,
    pub rows: Vec<TestRow>,
    pub image_sizes: BTreeMap<String, String>,
    pub build_logs: BuildLogAnalysis,
}
impl TestReport {
    pub fn new(test_case_id: &str) -> Self {
        let mut report = TestReport::default();

        let mut rng = rand::thread_rng();
        report.uuid = Uuid::from_u128(rng.gen::<u128>())
            .to_hyphenated()
            .to_string();
        report.test_case_id = test_case_id.to_string();
        report.start_time = now_millis();

        report
    }

    pub fn add_row(&mut self, param: &str, status: Status, message: &str) {
        self.add_row_queue(param, status, vec![message.to_string()]);
    }

    pub fn add_row_queue(&mut self, param: &str, status: Status, messages: Vec<String>) {
        self.rows.push(TestRow {
            param: param.to_string(),
            status,
            messages,
        });
    }

    /// Attaches the per-image build details shown below the build row.
    pub fn set_image_details(
        &mut self,
        build_logs: BuildLogAnalysis,
        image_sizes: BTreeMap<String, String>,
    ) {
        self.build_logs = build_logs;
        self.image_sizes = image_sizes;
    }

    pub fn finish(&mut self) {
        self.completion_time = now_millis();
    }

    /// A report passes when it has rows and none of them is `KO`.
    pub fn passed(&self) -> bool {
        !self.rows.is_empty() && self.rows.iter().all(|row| row.status == Status::Ok)
    }
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis())
        .unwrap_or_default()
}

//
// TESTS
//

#[cfg(test)]
mod tests {
    use crate::report::{Status, TestReport, OC_LOGIN_FAIL};

    #[test]
    fn it_will_not_pass_an_empty_report() {
        let report = TestReport::new("000100");
        assert!(!report.passed());
        assert_eq!(report.uuid.len(), 36);
    }

    #[test]
    fn it_will_fail_on_any_ko_row() {
        let mut report = TestReport::new("000100");
        report.add_row("N/A", Status::Ok, "pulled");
        assert!(report.passed());

        report.add_row("N/A", Status::Ko, OC_LOGIN_FAIL);
        assert!(!report.passed());
    }

    #[test]
    fn it_will_serialize_status_as_ok_ko() {
        let mut report = TestReport::new("000100");
        report.add_row("all", Status::from_bool(false), "build failed");
        report.finish();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["rows"][0]["status"], "KO");
        assert!(report.completion_time >= report.start_time);
    }
}
