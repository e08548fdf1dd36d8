//! One-time installer: instantiates the config templates for a tenant.
//!
//! Template files carry `{{ZkitSdk.<Name>}}` placeholders. Instantiation is
//! a plain substitution pass from an explicit variable map — no expression
//! evaluation. An unknown placeholder aborts the run so a typo never ships a
//! half-rendered config.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

/// Template variables for a tenant, derived the same way the hosted
/// installer derives them: a dedicated host id puts the tenant under a
/// `/tenant-<id>` root on a shared host; otherwise the tenant has the whole
/// host to itself and the root is empty.
pub fn tenant_vars(
    tenant_id: &str,
    admin_key: &str,
    host_id: Option<&str>,
) -> BTreeMap<String, String> {
    let (host, tenant_root) = match host_id {
        Some(h) => (format!("host-{h}"), format!("/tenant-{tenant_id}")),
        None => (tenant_id.to_owned(), String::new()),
    };
    let api_base = format!("https://{host}.api.tresorit.io");

    let mut vars = BTreeMap::new();
    vars.insert("ZkitSdk.AdminKey".into(), admin_key.to_owned());
    vars.insert(
        "ZkitSdk.AdminUserId".into(),
        format!("admin@{tenant_id}.tresorit.io"),
    );
    vars.insert("ZkitSdk.ApiBase".into(), api_base.clone());
    vars.insert("ZkitSdk.TenantRoot".into(), tenant_root);
    // Can differ from ApiBase when testing against a staging frame host.
    vars.insert("ZkitSdk.FrameOrigin".into(), api_base);
    vars
}

/// Substitute every `{{name}}` placeholder in `template` from `vars`.
/// Unknown or unterminated placeholders are errors.
pub fn render(template: &str, vars: &BTreeMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .context("unterminated '{{' placeholder in template")?;
        let name = after[..end].trim();
        let value = vars
            .get(name)
            .with_context(|| format!("unknown template variable '{name}'"))?;
        out.push_str(value);
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Walk `template_dir`, render every UTF-8 text file into `out_dir`, and
/// copy everything else verbatim. `.include` files are skipped. Returns the
/// number of files written.
pub fn instantiate(
    template_dir: &Path,
    out_dir: &Path,
    vars: &BTreeMap<String, String>,
) -> Result<usize> {
    let mut files = Vec::new();
    collect_files(template_dir, &mut files)?;

    let mut written = 0usize;
    for file in files {
        let rel = file
            .strip_prefix(template_dir)
            .expect("collected file is under template_dir");
        if file.extension().is_some_and(|ext| ext == "include") {
            continue;
        }

        let target = out_dir.join(rel);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }

        let bytes =
            std::fs::read(&file).with_context(|| format!("read template {}", file.display()))?;
        match String::from_utf8(bytes) {
            Ok(text) => {
                let rendered = render(&text, vars)
                    .with_context(|| format!("render template {}", rel.display()))?;
                std::fs::write(&target, rendered)
                    .with_context(|| format!("write {}", target.display()))?;
            }
            // Not text — images and the like pass through untouched.
            Err(raw) => {
                std::fs::write(&target, raw.into_bytes())
                    .with_context(|| format!("write {}", target.display()))?;
            }
        }

        info!(file = %rel.display(), "instantiated");
        written += 1;
    }
    Ok(written)
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}
