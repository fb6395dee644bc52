use crate::cli::modes;
use clap::{Arg, Command};

/// All the arguments that the CLI accepts.
pub mod args {
    pub const CONFIG: &str = "Config";
    pub const CLEAN: &str = "Clean";
    pub const QUIET: &str = "Quiet";
    pub const VERBOSE: &str = "Verbose";
    pub const MODE: &str = "Mode";
    pub const TEST_CASE_ID: &str = "Test Case ID";
    pub const TEST_CASE_ID_DEFAULT: &str = "000000";
    pub const NODE: &str = "Node";
    pub const IMAGES: &str = "Image(s)";
    pub const CHECK_INTERVAL: &str = "Check Interval";
    pub const OC_URL: &str = "OC URL";
    pub const OC_REGISTRY: &str = "OC Registry";
    pub const OC_NAMESPACE: &str = "OC Namespace";
    pub const OC_USER_NAME: &str = "OC User Name";
    pub const OC_PASSWORD: &str = "OC Password";
    pub const OC_PROJECT_NAME: &str = "OC Project Name";
    pub const RAN_REPOSITORY: &str = "RAN Repository";
    pub const RAN_BRANCH: &str = "RAN Branch";
    pub const RAN_COMMIT_ID: &str = "RAN Commit ID";
    pub const RAN_ALLOW_MERGE: &str = "RAN Allow Merge";
    pub const RAN_TARGET_BRANCH: &str = "RAN Target Branch";
    pub const NODE_ADDRESS: &str = "Node Address";
    pub const SOURCE_CODE_PATH: &str = "Source Code Path";
}

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Parses all the arguments from the CLI and returns the configured matches.
pub fn parse<'help>() -> Command<'help> {
    Command::new("ran_cluster_ci")
        .version(VERSION)
        .about("Builds and deploys RAN container images on an OpenShift cluster.")
        // Run options
        .arg(
            Arg::new(args::CONFIG)
                .help("Path to the ci.toml configuration file")
                .takes_value(true)
                .long("config")
        )
        .arg(
            Arg::new(args::CLEAN)
                .help("Removes the results directory")
                .takes_value(false)
                .short('c')
                .long("clean")
        )
        .arg(
            Arg::new(args::QUIET)
                .help(
                    "Only print a limited set of messages to stdout, keep the bulk of messages in log files only",
                )
                .takes_value(false)
                .short('q')
                .long("quiet")
        )
        .arg(
            Arg::new(args::VERBOSE)
                .help("Also print every command issued and its diagnostics to stdout")
                .takes_value(false)
                .short('v')
                .long("verbose")
        )
        .arg(
            Arg::new(args::MODE)
                .help("Build images on the cluster, pull them onto a node, or (un)deploy the core network")
                .long("mode")
                .short('m')
                .takes_value(true)
                .possible_values([modes::BUILD, modes::PULL, modes::DEPLOY_CN, modes::UNDEPLOY_CN])
        )
        .arg(
            Arg::new(args::TEST_CASE_ID)
                .help("Identifier of the test case this run reports into")
                .long("test-case-id")
                .takes_value(true)
                .default_value(args::TEST_CASE_ID_DEFAULT)
        )
        .arg(
            Arg::new(args::NODE)
                .help("Node the images are pulled onto or the core network is (un)deployed from")
                .long("node")
                .takes_value(true)
                .default_value("localhost")
        )
        .arg(
            Arg::new(args::IMAGES)
                .help("Name(s) of the image(s) to pull")
                .long("images")
                .short('i')
                .takes_value(true)
                .multiple_values(true)
        )
        .arg(
            Arg::new(args::CHECK_INTERVAL)
                .help("Seconds between two build status checks")
                .long("check-interval")
                .takes_value(true)
                .value_parser(clap::value_parser!(u64))
                .default_value("5")
        )
        // Cluster options
        .arg(
            Arg::new(args::OC_URL)
                .help("API URL of the OpenShift cluster")
                .long("oc-url")
                .takes_value(true)
        )
        .arg(
            Arg::new(args::OC_REGISTRY)
                .help("Image registry route of the cluster, without scheme and trailing slash")
                .long("oc-registry")
                .takes_value(true)
        )
        .arg(
            Arg::new(args::OC_NAMESPACE)
                .help("Namespace holding the RAN image streams")
                .long("oc-namespace")
                .takes_value(true)
        )
        .arg(
            Arg::new(args::OC_USER_NAME)
                .help("OpenShift user name")
                .long("oc-user-name")
                .takes_value(true)
        )
        .arg(
            Arg::new(args::OC_PASSWORD)
                .help("OpenShift password")
                .long("oc-password")
                .takes_value(true)
        )
        .arg(
            Arg::new(args::OC_PROJECT_NAME)
                .help("OpenShift project to switch to after login")
                .long("oc-project-name")
                .takes_value(true)
        )
        // RAN options
        .arg(
            Arg::new(args::RAN_REPOSITORY)
                .help("URL of the RAN repository")
                .long("ran-repository")
                .takes_value(true)
        )
        .arg(
            Arg::new(args::RAN_BRANCH)
                .help("Branch under test")
                .long("ran-branch")
                .takes_value(true)
        )
        .arg(
            Arg::new(args::RAN_COMMIT_ID)
                .help("Commit under test")
                .long("ran-commit-id")
                .takes_value(true)
        )
        .arg(
            Arg::new(args::RAN_ALLOW_MERGE)
                .help("The branch is a merge request merged into its target branch")
                .takes_value(false)
                .long("ran-allow-merge")
        )
        .arg(
            Arg::new(args::RAN_TARGET_BRANCH)
                .help("Target branch of the merge request")
                .long("ran-target-branch")
                .takes_value(true)
        )
        .arg(
            Arg::new(args::NODE_ADDRESS)
                .help("Server the cluster build is triggered from")
                .long("node-address")
                .takes_value(true)
        )
        .arg(
            Arg::new(args::SOURCE_CODE_PATH)
                .help("Path of the RAN workspace on that server")
                .long("source-code-path")
                .takes_value(true)
        )
}

//
// TESTS
//
