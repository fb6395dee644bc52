use crate::cluster::{oc_login, oc_logout};
use crate::cmd::{Cmd, RunOptions};
use crate::config::CiConfig;
use crate::containerize::{create_tag, pull_images};
use crate::error::CiResult;
use crate::io::Logger;
use crate::report::{Status, TestReport, OC_LOGIN_FAIL};

/// Pulls the images built for the configured commit from the cluster
/// registry onto the node `cmd` runs on.
pub fn pull_cluster_images(
    cmd: &mut dyn Cmd,
    config: &CiConfig,
    node: &str,
    images: &[String],
    report: &mut TestReport,
    logger: &Logger,
) -> CiResult<bool> {
    logger.debug(format!("Pull OC image {:?} to server {}", images, node))?;
    let cluster = &config.cluster;

    let login = oc_login(cmd, cluster, &cluster.namespace, logger)?;
    if !login.is_logged_in() {
        report.add_row("N/A", Status::Ko, OC_LOGIN_FAIL);
        return Ok(false);
    }

    let ret = cmd.run_with(
        &format!(
            "oc whoami -t | docker login -u oaicicd --password-stdin {}",
            cluster.registry
        ),
        RunOptions::silent(),
    )?;
    if !ret.success() {
        logger.error("cannot authenticate at registry")?;
        oc_logout(cmd)?;
        report.add_row("N/A", Status::Ko, OC_LOGIN_FAIL);
        return Ok(false);
    }

    let tag = create_tag(&config.ran.commit_id, &config.ran.branch, config.ran.allow_merge);
    let registry = format!("{}/{}", cluster.registry, cluster.namespace);
    let (pulled, message) = pull_images(cmd, images, &tag, &registry, logger)?;
    oc_logout(cmd)?;

    report.add_row_queue(
        &format!("on node {}", node),
        Status::from_bool(pulled),
        vec![message],
    );
    Ok(pulled)
}

//
// TESTS
//

#[cfg(test)]
mod tests {
    use crate::cluster::pull::pull_cluster_images;
    use crate::cluster::tests::{quiet_logger, settings};
    use crate::cmd::fake::ScriptedCmd;
    use crate::config::CiConfig;
    use crate::report::{Status, TestReport};

    fn config() -> CiConfig {
        let mut config = CiConfig::default();
        config.cluster = settings();
        config.ran.branch = "develop".to_string();
        config.ran.commit_id = "fedcba9876543210".to_string();
        config
    }

    #[test]
    fn it_can_pull_cluster_images() {
        let mut cmd = ScriptedCmd::new();
        let mut report = TestReport::new("000010");
        let images = vec!["oai-gnb".to_string()];

        let pulled =
            pull_cluster_images(&mut cmd, &config(), "obelix", &images, &mut report, &quiet_logger())
                .unwrap();

        assert!(pulled);
        assert!(cmd.ran("oc project oaicicd-ran"));
        assert!(cmd.ran(
            "docker pull default-route-openshift-image-registry.apps.oai.cs.eurecom.fr/oaicicd-ran/oai-gnb:develop-fedcba98"
        ));
        assert!(cmd.commands.last().unwrap().contains("oc logout"));
        assert_eq!(report.rows[0].param, "on node obelix");
        assert_eq!(report.rows[0].status, Status::Ok);
    }

    #[test]
    fn it_will_not_pull_without_registry_access() {
        let mut cmd = ScriptedCmd::new().on("docker login", 1, "unauthorized");
        let mut report = TestReport::new("000010");
        let images = vec!["oai-gnb".to_string()];

        let pulled =
            pull_cluster_images(&mut cmd, &config(), "obelix", &images, &mut report, &quiet_logger())
                .unwrap();

        assert!(!pulled);
        assert!(!cmd.ran("docker pull"));
        assert!(cmd.ran("oc logout"));
        assert_eq!(report.rows[0].status, Status::Ko);
    }
}
