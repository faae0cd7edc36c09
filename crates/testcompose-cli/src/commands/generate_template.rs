//! `testcompose generate-template` — Write a starter config file.

use std::path::PathBuf;

use clap::Args;
use testcompose_compose::templates::{self, Component, TemplateKind};

/// Arguments for the `generate-template` command.
#[derive(Args, Debug)]
pub struct GenerateTemplateArgs {
    /// Component to include: app, broker or db. Repeat for several.
    #[arg(long = "component", required = true)]
    pub components: Vec<Component>,

    /// Write to this file instead of stdout. Never overwritten.
    #[arg(long)]
    pub template_file: Option<PathBuf>,
}

/// Executes the `generate-template` command.
///
/// # Errors
///
/// Returns an error if the target file already exists, its directory is
/// missing, or the template cannot be rendered or written.
pub fn execute(args: &GenerateTemplateArgs) -> anyhow::Result<()> {
    let kind = TemplateKind::from_components(&args.components)?;
    let yaml = templates::render_yaml(&kind.build()?)?;

    let Some(path) = &args.template_file else {
        print!("{yaml}");
        return Ok(());
    };
    write_new(path, &yaml)?;
    println!("Config file {} successfully written", path.display());
    Ok(())
}

/// Writes `content` to `path`, refusing to replace an existing file.
fn write_new(path: &std::path::Path, content: &str) -> anyhow::Result<()> {
    if path.exists() {
        anyhow::bail!("config file {} already exists", path.display());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.is_dir() {
            anyhow::bail!("directory {} does not exist", parent.display());
        }
    }
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "template written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_template_to_new_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("testcompose.yaml");
        let args = GenerateTemplateArgs {
            components: vec![Component::App, Component::Db],
            template_file: Some(path.clone()),
        };
        execute(&args).expect("generate");

        let written = std::fs::read_to_string(&path).expect("read");
        let parsed = testcompose_compose::parser::parse_config(&written).expect("valid config");
        assert_eq!(parsed.services.len(), 2);
    }

    #[test]
    fn existing_file_is_not_overwritten() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("testcompose.yaml");
        std::fs::write(&path, "keep me").expect("seed");
        let args = GenerateTemplateArgs {
            components: vec![Component::Broker],
            template_file: Some(path.clone()),
        };
        assert!(execute(&args).is_err());
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "keep me");
    }

    #[test]
    fn missing_directory_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("testcompose.yaml");
        assert!(write_new(&path, "x").is_err());
        assert!(!path.exists());
    }
}
