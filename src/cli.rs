use crate::cluster::core_network::{deploy_cn, undeploy_cn, Deployment};
use crate::cluster::pipeline::ClusterBuild;
use crate::cluster::pull::pull_cluster_images;
use crate::cmd::get_connection;
use crate::config::CiConfig;
use crate::error::CiError::{MissingParameterError, TestFailedError, UnknownModeError};
use crate::error::CiResult;
use crate::io::{create_results_dir, print_report_summary, Logger};
use crate::options;
use crate::report::{Status, TestReport};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub mod modes {
    pub const BUILD: &str = "build";
    pub const PULL: &str = "pull";
    pub const DEPLOY_CN: &str = "deploy-cn";
    pub const UNDEPLOY_CN: &str = "undeploy-cn";
}

/// Runs the CLI matching the arguments/options passed and handling each.
pub fn run() -> CiResult<()> {
    let mut app = options::parse();
    let matches = app.clone().get_matches();

    if matches.is_present(options::args::CLEAN) {
        std::fs::remove_dir_all("results")?;
        return Ok(());
    }

    let mode = match matches.value_of(options::args::MODE) {
        Some(mode) => mode.to_string(),
        None => {
            app.print_help()?;
            println!();
            return Ok(());
        }
    };

    let config = CiConfig::load(&matches)?;
    let results_dir = create_results_dir()?;
    let mut logger = Logger::in_dir(&results_dir);
    logger.quiet = matches.is_present(options::args::QUIET);
    logger.verbose = matches.is_present(options::args::VERBOSE);
    logger.set_log_file("ci.log");
    let local_dir = logger
        .results_dir()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&results_dir));

    let test_case_id = matches
        .value_of(options::args::TEST_CASE_ID)
        .unwrap_or(options::args::TEST_CASE_ID_DEFAULT);
    let node = matches.value_of(options::args::NODE).unwrap_or("localhost");
    let mut report = TestReport::new(test_case_id);

    let passed = match mode.as_str() {
        modes::BUILD => {
            // only the build waits on the cluster, other modes keep the default Ctrl-C
            let cancel = Arc::new(AtomicBool::new(false));
            {
                let cancel = cancel.clone();
                ctrlc::set_handler(move || cancel.store(true, Ordering::SeqCst))?;
            }
            let check_interval = matches
                .get_one::<u64>(options::args::CHECK_INTERVAL)
                .copied()
                .unwrap_or(5);
            let mut cmd = get_connection(&config.node.address, &logger);
            ClusterBuild::new(cmd.as_mut(), &config, &cancel, &logger)
                .with_check_interval(Duration::from_secs(check_interval))
                .run(&mut report, &local_dir)?
        }
        modes::PULL => {
            let images: Vec<String> = match matches.values_of(options::args::IMAGES) {
                Some(images) => images.map(|image| image.to_string()).collect(),
                None => return Err(MissingParameterError("no images to pull".to_string())),
            };
            let mut cmd = get_connection(node, &logger);
            let pulled = pull_cluster_images(
                cmd.as_mut(),
                &config,
                node,
                &images,
                &mut report,
                &logger,
            )?;
            cmd.close()?;
            pulled
        }
        modes::DEPLOY_CN | modes::UNDEPLOY_CN => {
            let namespace = config.cluster.project_name.clone();
            let path = config.node.source_code_path.clone();
            let mut cmd = get_connection(node, &logger);
            let deployment = if mode == modes::DEPLOY_CN {
                deploy_cn(cmd.as_mut(), &config.cluster, &namespace, &path, &logger)?
            } else {
                undeploy_cn(
                    cmd.as_mut(),
                    &config.cluster,
                    &namespace,
                    &path,
                    &local_dir,
                    &logger,
                )?
            };
            cmd.close()?;
            match deployment {
                Deployment::Done(pods) => {
                    report.add_row(&format!("on node {}", node), Status::Ok, &pods);
                    true
                }
                Deployment::Failed(message) => {
                    report.add_row(&format!("on node {}", node), Status::Ko, message);
                    false
                }
            }
        }
        _ => return Err(UnknownModeError(mode.clone())),
    };

    report.finish();
    logger.write_report(&report)?;
    print_report_summary(&report, &logger)?;

    if passed && report.passed() {
        Ok(())
    } else {
        Err(TestFailedError(mode))
    }
}
