use anyhow::{Context, Result};
use kube::CustomResourceExt;
use wgmesh_directory::{Gateway, Peer};

/// Render both CRDs as a multi-document YAML stream
pub(crate) fn render() -> Result<String> {
    let peer = serde_yaml::to_string(&Peer::crd()).context("Failed to render Peer CRD")?;
    let gateway =
        serde_yaml::to_string(&Gateway::crd()).context("Failed to render Gateway CRD")?;
    Ok(format!("---\n{peer}---\n{gateway}"))
}

pub(crate) fn crds() -> Result<()> {
    print!("{}", render()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_both_crds() {
        let yaml = render().unwrap();
        assert!(yaml.contains("name: peers.aks.azure.com"));
        assert!(yaml.contains("name: gateways.aks.azure.com"));
        assert_eq!(yaml.matches("---\n").count(), 2);
    }
}
