use crate::cluster::IMAGE_REGISTRY_SERVICE_NAME;
use crate::cmd::{Cmd, RunOptions};
use crate::error::CiResult;
use crate::io::Logger;
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde_json::Value;

lazy_static! {
    static ref BUILDCONFIG_CREATED: Regex =
        Regex::new(r"buildconfig\.build\.openshift\.io/[a-zA-Z\-0-9]+ created").unwrap();
    static ref POD_CREATED: Regex = Regex::new(r"pod/(?P<pod>[a-zA-Z0-9_\-]+) created").unwrap();
}

/// Lists every image stream tag with its creation timestamp, one per line.
const LIST_IMAGE_TAGS: &str = r#"oc get istag -o go-template --template '{{range .items}}{{.metadata.name}} {{.metadata.creationTimestamp}}{{"\n"}}{{end}}'"#;

/// Re-creates the `etc-pki-entitlement` secret from the cluster-managed one
/// so that builds can install subscription content. Failure to delete the
/// old secret is ignored.
pub fn recreate_entitlements(cmd: &mut dyn Cmd, logger: &Logger) -> CiResult<bool> {
    cmd.run_with(
        "oc delete secret etc-pki-entitlement",
        RunOptions::ignore_non_zero(),
    )?;
    let ret = cmd.run_with(
        "oc get secret etc-pki-entitlement -n openshift-config-managed -o json \
         | jq 'del(.metadata.resourceVersion)' | jq 'del(.metadata.creationTimestamp)' \
         | jq 'del(.metadata.uid)' | jq 'del(.metadata.namespace)' | oc create -f -",
        RunOptions::silent(),
    )?;
    if !ret.success() {
        logger.error("could not create secret/etc-pki-entitlement")?;
        return Ok(false);
    }
    Ok(true)
}

/// Points the BuildConfig in `file` at `name:tag` and re-creates it.
pub fn recreate_bc(
    cmd: &mut dyn Cmd,
    name: &str,
    tag: &str,
    file: &str,
    logger: &Logger,
) -> CiResult<bool> {
    retag_image_statement(cmd, name, name, tag, file)?;
    cmd.run_with(&format!("oc delete -f {}", file), RunOptions::ignore_non_zero())?;
    let ret = cmd.run(&format!("oc create -f {}", file))?;
    if BUILDCONFIG_CREATED.is_match(&ret.stdout) {
        return Ok(true);
    }
    logger.error(format!("error while creating buildconfig: {}", ret.stdout))?;
    Ok(false)
}

/// Makes sure the ImageStream `name` exists (creating it from `file`) and
/// that `name:tag` is a fresh, empty image stream tag.
pub fn recreate_is_tag(
    cmd: &mut dyn Cmd,
    name: &str,
    tag: &str,
    file: &str,
    logger: &Logger,
) -> CiResult<bool> {
    let ret = cmd.run_with(&format!("oc describe is {}", name), RunOptions::ignore_non_zero())?;
    if !ret.success() {
        let ret = cmd.run(&format!("oc create -f {}", file))?;
        if !ret.success() {
            logger.error(format!("error while creating imagestream: {}", ret.stdout))?;
            return Ok(false);
        }
    } else {
        logger.debug(format!("-> imagestream {} found", name))?;
    }

    let image = format!("{}:{}", name, tag);
    cmd.run_with(&format!("oc delete istag {}", image), RunOptions::ignore_non_zero())?;
    let ret = cmd.run(&format!("oc create istag {}", image))?;
    if ret.success() {
        return Ok(true);
    }
    logger.error(format!("error while creating imagestreamtag: {}", ret.stdout))?;
    Ok(false)
}

/// Rewrites every `old_image:latest` in `file` to `new_image:new_tag`.
pub fn retag_image_statement(
    cmd: &mut dyn Cmd,
    old_image: &str,
    new_image: &str,
    new_tag: &str,
    file: &str,
) -> CiResult<()> {
    cmd.run(&format!(
        "sed -i -e \"s#{}:latest#{}:{}#\" {}",
        old_image, new_image, new_tag, file
    ))?;
    Ok(())
}

/// Returns the uncompressed size in bytes of `image:tag` as recorded by the
/// registry of `namespace`, or `None` if the image cannot be found.
pub fn get_image_size(
    cmd: &mut dyn Cmd,
    namespace: &str,
    image: &str,
    tag: &str,
) -> CiResult<Option<u64>> {
    let ret = cmd.run(&format!("oc describe is {} | grep -A4 {}", image, tag))?;
    let image_sha = Regex::new(&format!(
        "{}:5000/{}/(?P<sha>{}@sha256:[a-f0-9]+)",
        regex::escape(IMAGE_REGISTRY_SERVICE_NAME),
        regex::escape(namespace),
        regex::escape(image)
    ))?;
    let sha = match image_sha.captures(&ret.stdout) {
        Some(captures) => captures["sha"].to_string(),
        None => return Ok(None),
    };

    let ret = cmd.run(&format!("oc get -o json isimage {}", sha))?;
    let size = serde_json::from_str::<Value>(&ret.stdout)
        .ok()
        .and_then(|json| json.pointer("/image/dockerImageMetadata/Size").cloned())
        .and_then(|size| size.as_u64());
    Ok(size)
}

/// Creates the pod described in `file` and waits up to `timeout_secs` for it
/// to become ready. Returns the pod name; on failure the pod is removed.
pub fn deploy_pod(
    cmd: &mut dyn Cmd,
    file: &str,
    timeout_secs: u64,
    logger: &Logger,
) -> CiResult<Option<String>> {
    let ret = cmd.run(&format!("oc create -f {}", file))?;
    let pod = match POD_CREATED.captures(&ret.stdout) {
        Some(captures) => captures["pod"].to_string(),
        None => {
            logger.error(format!("could not deploy pod: {}", ret.stdout))?;
            return Ok(None);
        }
    };

    logger.debug(format!("checking if pod {} is in Running state", pod))?;
    let ret = cmd.run_with(
        &format!(
            "oc wait --for=condition=ready pod {} --timeout={}s",
            pod, timeout_secs
        ),
        RunOptions {
            silent: true,
            timeout: Some(std::time::Duration::from_secs(timeout_secs + 10)),
            ..RunOptions::default()
        },
    )?;
    if ret.success() {
        return Ok(Some(pod));
    }
    logger.error(format!("pod {} did not reach Running state", pod))?;
    undeploy_pod(cmd, file)?;
    Ok(None)
}

pub fn undeploy_pod(cmd: &mut dyn Cmd, file: &str) -> CiResult<()> {
    cmd.run(&format!("oc delete -f {}", file))?;
    Ok(())
}

/// Deletes every image stream tag created more than `max_age` ago. The
/// images themselves become dangling and are pruned by the registry.
pub fn delete_stale_image_tags(
    cmd: &mut dyn Cmd,
    max_age: Duration,
    logger: &Logger,
) -> CiResult<Vec<String>> {
    let ret = cmd.run_with(LIST_IMAGE_TAGS, RunOptions::silent())?;
    let stale = stale_image_tags(&ret.stdout, Utc::now() - max_age);
    if !stale.is_empty() {
        cmd.run(&format!("oc delete istag {}", stale.join(" ")))?;
    }
    logger.debug(format!("deleted images:\n{}", stale.join("\n")))?;
    Ok(stale)
}

/// Picks the tags of an `istag` listing (`<name> <RFC 3339 timestamp>` per
/// line) that were created at or before `cutoff`. Unparseable lines are
/// skipped.
pub fn stale_image_tags(listing: &str, cutoff: DateTime<Utc>) -> Vec<String> {
    listing
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let name = fields.next()?;
            let created = DateTime::parse_from_rfc3339(fields.next()?).ok()?;
            if created.with_timezone(&Utc) <= cutoff {
                Some(name.to_string())
            } else {
                None
            }
        })
        .collect()
}

//
// TESTS
//
