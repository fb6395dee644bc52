use crate::cluster::{oc_login, oc_logout};
use crate::cmd::{Cmd, RunOptions};
use crate::config::ClusterSettings;
use crate::error::CiResult;
use crate::io::Logger;
use crate::report::OC_PROJECT_FAIL;
use std::path::Path;

pub const CN_RELEASE: &str = "oai5gcn";
pub const CN_LOG_ARCHIVE: &str = "test_logs_CN.tar";

/// Core network functions whose logs are collected before undeployment,
/// with the container to read logs from when the pod has several.
pub const CN_IMAGES: [(&str, Option<&str>); 9] = [
    ("mysql", None),
    ("oai-nrf", Some("nrf")),
    ("oai-amf", Some("amf")),
    ("oai-smf", Some("smf")),
    ("oai-upf", Some("upf")),
    ("oai-ausf", Some("ausf")),
    ("oai-udm", Some("udm")),
    ("oai-udr", Some("udr")),
    ("oai-traffic-server", None),
];

#[derive(Debug, PartialEq)]
pub enum Deployment {
    /// Carries the pod listing after the operation.
    Done(String),
    Failed(&'static str),
}

/// Installs the core network Helm chart shipped in the RAN workspace at
/// `path`, replacing any previous release.
pub fn deploy_cn(
    cmd: &mut dyn Cmd,
    settings: &ClusterSettings,
    namespace: &str,
    path: &str,
    logger: &Logger,
) -> CiResult<Deployment> {
    logger.debug(format!(
        "OC OAI CN5G: Deploying OAI CN5G on Openshift Cluster: {}",
        namespace
    ))?;
    let login = oc_login(cmd, settings, namespace, logger)?;
    if !login.is_logged_in() {
        return Ok(Deployment::Failed(login.failure_message()));
    }

    cmd.run_with(
        &format!("helm uninstall {} --wait --timeout 60s", CN_RELEASE),
        RunOptions::ignore_non_zero(),
    )?;
    let ret = cmd.run(&format!(
        "helm install --wait --timeout 120s {} {}/ci-scripts/charts/oai-5g-basic/.",
        CN_RELEASE, path
    ))?;
    if !ret.success() {
        logger.error("OC OAI CN5G: Deployment failed")?;
        oc_logout(cmd)?;
        return Ok(Deployment::Failed(OC_PROJECT_FAIL));
    }

    let pods = cmd.run("oc get pods")?;
    oc_logout(cmd)?;
    Ok(Deployment::Done(pods.stdout))
}

/// Collects the core network logs into `<path>/logs`, copies them to
/// `local_dir` as `test_logs_CN.tar` and uninstalls the release.
pub fn undeploy_cn(
    cmd: &mut dyn Cmd,
    settings: &ClusterSettings,
    namespace: &str,
    path: &str,
    local_dir: &Path,
    logger: &Logger,
) -> CiResult<Deployment> {
    logger.debug(format!(
        "OC OAI CN5G: Terminating CN on Openshift Cluster: {}",
        namespace
    ))?;
    let login = oc_login(cmd, settings, namespace, logger)?;
    if !login.is_logged_in() {
        return Ok(Deployment::Failed(login.failure_message()));
    }

    let log_dir = format!("{}/logs", path);
    cmd.run(&format!("rm -Rf {}", log_dir))?;
    cmd.run(&format!("mkdir -p {}", log_dir))?;
    logger.debug("OC OAI CN5G: Collecting log files to workspace")?;
    cmd.run(&format!("oc describe pod &> {}/describe-pods-post-test.log", log_dir))?;
    cmd.run(&format!("oc get pods.metrics.k8s &> {}/nf-resource-consumption.log", log_dir))?;
    for (image, container) in CN_IMAGES.iter() {
        let ret = cmd.run(&format!("oc get pods | grep {} | awk '{{print $1}}'", image))?;
        let pod = ret.stdout.lines().next().unwrap_or_default().trim().to_string();
        if pod.is_empty() {
            logger.debug(format!("{} pod not found!", image))?;
            continue;
        }
        let container = container
            .map(|container| format!(" -c {}", container))
            .unwrap_or_default();
        cmd.run(&format!(
            "oc logs {}{} &> {}/{}.log",
            pod, container, log_dir, image
        ))?;
    }
    cmd.run(&format!("cd {} && tar -cf {} *.log", log_dir, CN_LOG_ARCHIVE))?;
    cmd.copyin(
        &format!("{}/{}", log_dir, CN_LOG_ARCHIVE),
        &local_dir.join(CN_LOG_ARCHIVE),
    )?;

    let uninstall = format!("helm uninstall --wait --timeout 60s {}", CN_RELEASE);
    let ret = cmd.run(&uninstall)?;
    if !ret.success() {
        logger.error("OC OAI CN5G: Undeployment failed")?;
        cmd.run(&uninstall)?;
        oc_logout(cmd)?;
        return Ok(Deployment::Failed(OC_PROJECT_FAIL));
    }

    let pods = cmd.run("oc get pods")?;
    oc_logout(cmd)?;
    Ok(Deployment::Done(pods.stdout))
}

//
// TESTS
//

#[cfg(test)]
mod tests {
    use crate::cluster::core_network::{deploy_cn, undeploy_cn, Deployment, CN_LOG_ARCHIVE};
    use crate::cluster::tests::{quiet_logger, settings};
    use crate::cmd::fake::ScriptedCmd;
    use crate::report::{OC_LOGIN_FAIL, OC_PROJECT_FAIL};
    use std::path::Path;

    const PODS: &str = "NAME READY STATUS\noai-amf-7d9c 2/2 Running\n";

    #[test]
    fn it_can_deploy_the_core_network() {
        let mut cmd = ScriptedCmd::new().on("oc get pods", 0, PODS);
        let deployment =
            deploy_cn(&mut cmd, &settings(), "oaicicd-core", "/opt/oai", &quiet_logger()).unwrap();

        assert_eq!(deployment, Deployment::Done(PODS.to_string()));
        assert!(
            cmd.position("helm uninstall oai5gcn").unwrap()
                < cmd.position("helm install --wait --timeout 120s oai5gcn /opt/oai/ci-scripts/charts/oai-5g-basic/.").unwrap()
        );
        assert!(cmd.ran("oc project oaicicd-core"));
    }

    #[test]
    fn it_will_report_a_failed_deployment() {
        let mut cmd = ScriptedCmd::new().on("helm install", 1, "Error: timed out");
        let deployment =
            deploy_cn(&mut cmd, &settings(), "oaicicd-core", "/opt/oai", &quiet_logger()).unwrap();

        assert_eq!(deployment, Deployment::Failed(OC_PROJECT_FAIL));
        assert!(cmd.ran("oc logout"));
    }

    #[test]
    fn it_will_not_deploy_without_login() {
        let mut cmd = ScriptedCmd::new().on("oc login", 1, "");
        let deployment =
            deploy_cn(&mut cmd, &settings(), "oaicicd-core", "/opt/oai", &quiet_logger()).unwrap();

        assert_eq!(deployment, Deployment::Failed(OC_LOGIN_FAIL));
        assert!(!cmd.ran("helm"));
    }

    #[test]
    fn it_will_collect_logs_before_undeploying() {
        let mut cmd = ScriptedCmd::new()
            .on("grep oai-amf", 0, "oai-amf-7d9c\n")
            .on("grep mysql", 0, "mysql-5f6b\n");
        let deployment = undeploy_cn(
            &mut cmd,
            &settings(),
            "oaicicd-core",
            "/opt/oai",
            Path::new("/tmp/results"),
            &quiet_logger(),
        )
        .unwrap();

        assert!(matches!(deployment, Deployment::Done(_)));
        assert!(cmd.ran("oc logs oai-amf-7d9c -c amf &> /opt/oai/logs/oai-amf.log"));
        assert!(cmd.ran("oc logs mysql-5f6b &> /opt/oai/logs/mysql.log"));
        assert!(!cmd.ran("oc logs  &>"));
        assert_eq!(cmd.copied[0].0, format!("/opt/oai/logs/{}", CN_LOG_ARCHIVE));
        assert!(
            cmd.position("oc logs oai-amf").unwrap()
                < cmd.position("helm uninstall").unwrap()
        );
    }

    #[test]
    fn it_will_retry_a_failed_uninstall() {
        let mut cmd = ScriptedCmd::new().on("helm uninstall", 1, "Error: timed out");
        let deployment = undeploy_cn(
            &mut cmd,
            &settings(),
            "oaicicd-core",
            "/opt/oai",
            Path::new("/tmp/results"),
            &quiet_logger(),
        )
        .unwrap();

        assert_eq!(deployment, Deployment::Failed(OC_PROJECT_FAIL));
        assert_eq!(cmd.count("helm uninstall"), 2);
    }
}
