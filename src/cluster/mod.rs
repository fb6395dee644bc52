//! The cluster module drives an OpenShift cluster through the `oc` and
//! `helm` command-line clients: logging in, (re)creating build resources,
//! running builds and deploying the core network.

use crate::cmd::{Cmd, RunOptions};
use crate::config::ClusterSettings;
use crate::error::CiError::{InvalidRegistryError, MissingParameterError};
use crate::error::CiResult;
use crate::io::Logger;
use crate::report::{OC_LOGIN_FAIL, OC_PROJECT_FAIL};
use colored::Colorize;

pub mod build;
pub mod core_network;
pub mod pipeline;
pub mod pull;
pub mod resources;

/// In-cluster address of the image registry, as referenced by image streams
/// and Dockerfiles.
pub const IMAGE_REGISTRY_SERVICE_NAME: &str = "image-registry.openshift-image-registry.svc";

/// Outcome of `oc_login`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Login {
    LoggedIn,
    LoginFailed,
    ProjectUnavailable,
}

impl Login {
    pub fn is_logged_in(self) -> bool {
        self == Login::LoggedIn
    }

    /// Report message for a failed login.
    pub fn failure_message(self) -> &'static str {
        match self {
            Login::LoggedIn => "",
            Login::LoginFailed => OC_LOGIN_FAIL,
            Login::ProjectUnavailable => OC_PROJECT_FAIL,
        }
    }
}

/// Checks that credentials and the registry route are usable.
pub fn validate_settings(settings: &ClusterSettings, project: &str) -> CiResult<()> {
    if settings.user_name.is_empty() || settings.password.is_empty() || project.is_empty() {
        return Err(MissingParameterError("no OC Credentials".to_string()));
    }
    if settings.registry.starts_with("http") || settings.registry.ends_with('/') {
        return Err(InvalidRegistryError(settings.registry.clone()));
    }
    Ok(())
}

/// Logs into the cluster and switches to `project`. A failed project switch
/// logs out again.
pub fn oc_login(
    cmd: &mut dyn Cmd,
    settings: &ClusterSettings,
    project: &str,
    logger: &Logger,
) -> CiResult<Login> {
    validate_settings(settings, project)?;

    let ret = cmd.run_with(
        &format!(
            "oc login -u {} -p {} --server {}",
            settings.user_name, settings.password, settings.url
        ),
        RunOptions::silent(),
    )?;
    if !ret.success() {
        logger.error(" OC Cluster Login Failed".bold())?;
        return Ok(Login::LoginFailed);
    }

    let ret = cmd.run(&format!("oc project {}", project))?;
    if !ret.success() {
        logger.error(format!("Unable to access OC project {}", project).bold())?;
        oc_logout(cmd)?;
        return Ok(Login::ProjectUnavailable);
    }

    Ok(Login::LoggedIn)
}

pub fn oc_logout(cmd: &mut dyn Cmd) -> CiResult<()> {
    cmd.run("oc logout")?;
    Ok(())
}

//
// TESTS
//

#[cfg(test)]
pub(crate) mod tests {
    use crate::cluster::{oc_login, validate_settings, Login};
    use crate::cmd::fake::ScriptedCmd;
    use crate::config::ClusterSettings;
    use crate::io::Logger;

    pub fn settings() -> ClusterSettings {
        ClusterSettings {
            user_name: "oaicicd".to_string(),
            password: "secret".to_string(),
            project_name: "oaicicd-ran".to_string(),
            ..ClusterSettings::default()
        }
    }

    pub fn quiet_logger() -> Logger {
        let mut logger = Logger::default();
        logger.quiet = true;
        logger
    }

    #[test]
    fn it_will_reject_missing_credentials() {
        let mut settings = settings();
        settings.password.clear();
        assert!(validate_settings(&settings, "oaicicd-ran").is_err());
        assert!(validate_settings(&self::settings(), "").is_err());
    }

    #[test]
    fn it_will_reject_a_registry_url() {
        let mut settings = settings();
        settings.registry = "https://registry.example.org".to_string();
        assert!(validate_settings(&settings, "oaicicd-ran").is_err());

        settings.registry = "registry.example.org/".to_string();
        assert!(validate_settings(&settings, "oaicicd-ran").is_err());
    }

    #[test]
    fn it_can_login_and_switch_project() {
        let mut cmd = ScriptedCmd::new();
        let login = oc_login(&mut cmd, &settings(), "oaicicd-ran", &quiet_logger()).unwrap();
        assert!(login.is_logged_in());
        assert_eq!(
            cmd.commands,
            vec![
                "oc login -u oaicicd -p secret --server https://api.oai.cs.eurecom.fr:6443",
                "oc project oaicicd-ran",
            ]
        );
    }

    #[test]
    fn it_will_not_switch_project_after_a_failed_login() {
        let mut cmd = ScriptedCmd::new().on("oc login", 1, "Login failed");
        assert_eq!(
            oc_login(&mut cmd, &settings(), "oaicicd-ran", &quiet_logger()).unwrap(),
            Login::LoginFailed
        );
        assert!(!cmd.ran("oc project"));
    }

    #[test]
    fn it_will_logout_when_the_project_is_not_accessible() {
        let mut cmd = ScriptedCmd::new().on("oc project", 1, "forbidden");
        assert_eq!(
            oc_login(&mut cmd, &settings(), "oaicicd-ran", &quiet_logger()).unwrap(),
            Login::ProjectUnavailable
        );
        assert!(cmd.ran("oc logout"));
    }
}
