//! `info`: products, components, owners and versions.

use crate::cli::InfoArgs;
use crate::error::{MiError, Result};
use crate::mi::{FrameKind, FrameSink};
use crate::tracker::Tracker;

fn fields(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

pub async fn run(tracker: &dyn Tracker, args: &InfoArgs, output: &mut dyn FrameSink) -> Result<()> {
    let mut lines: Vec<String> = Vec::new();

    if args.products {
        let products = tracker.products(&[], &fields(&["name", "id"])).await?;
        lines = products.into_iter().map(|p| p.name).collect();
        lines.sort();
    } else if let Some(product) = &args.components {
        let include = fields(&["name", "id", "components.name", "components.is_active"]);
        let found = tracker.products(&[product.clone()], &include).await?;
        let product = found
            .into_iter()
            .next()
            .ok_or_else(|| unknown_product(product))?;
        lines = product
            .components
            .into_iter()
            .filter(|c| !args.active_components || c.is_active)
            .map(|c| c.name)
            .collect();
        lines.sort();
    } else if let Some(product) = &args.component_owners {
        let include = fields(&[
            "name",
            "id",
            "components.name",
            "components.default_assigned_to",
            "components.is_active",
        ]);
        let found = tracker.products(&[product.clone()], &include).await?;
        let product = found
            .into_iter()
            .next()
            .ok_or_else(|| unknown_product(product))?;
        let mut owners: Vec<(String, String)> = product
            .components
            .into_iter()
            .filter(|c| !args.active_components || c.is_active)
            .map(|c| (c.name, c.default_assigned_to.unwrap_or_default()))
            .collect();
        owners.sort();
        lines = owners
            .into_iter()
            .map(|(name, owner)| format!("{}: {}", name, owner))
            .collect();
    } else if let Some(product) = &args.versions {
        let include = fields(&["name", "id", "versions"]);
        let found = tracker.products(&[product.clone()], &include).await?;
        let product = found
            .into_iter()
            .next()
            .ok_or_else(|| unknown_product(product))?;
        lines = product
            .versions
            .into_iter()
            .map(|v| v.name.unwrap_or_default())
            .collect();
    }

    tracing::debug!("info produced {} lines", lines.len());
    let payload: String = lines.iter().map(|line| format!("{}\n", line)).collect();
    output.emit(FrameKind::String, &payload).await?;
    Ok(())
}

fn unknown_product(name: &str) -> MiError {
    MiError::Usage(format!("Unknown product '{}'", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{frames, tracker_with, writer};
    use crate::tracker::mock::{product, MockServer};
    use bugzilla_rest::{Component, Version};

    fn fedora() -> bugzilla_rest::Product {
        let mut p = product("Fedora");
        p.components = vec![
            Component {
                name: "kernel".into(),
                default_assigned_to: Some("kernel-maint@example.com".into()),
                is_active: true,
            },
            Component {
                name: "anaconda".into(),
                default_assigned_to: Some("installer@example.com".into()),
                is_active: false,
            },
        ];
        p.versions = vec![
            Version {
                name: Some("rawhide".into()),
                is_active: true,
            },
            Version {
                name: None,
                is_active: true,
            },
            Version {
                name: Some("40".into()),
                is_active: true,
            },
        ];
        p
    }

    async fn info(args: InfoArgs) -> (Result<()>, Vec<crate::mi::frame::Frame>) {
        let server = MockServer {
            products: vec![fedora(), product("EPEL")],
            ..Default::default()
        };
        let (_factory, tracker) = tracker_with(server).await;
        let mut out = writer();
        let result = run(tracker.as_ref(), &args, &mut out).await;
        (result, frames(out))
    }

    #[tokio::test]
    async fn test_products_sorted() {
        let (result, frames) = info(InfoArgs {
            products: true,
            ..Default::default()
        })
        .await;
        result.unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, FrameKind::String);
        assert_eq!(frames[0].payload, "EPEL\nFedora\n");
    }

    #[tokio::test]
    async fn test_components_and_active_filter() {
        let (_, frames) = info(InfoArgs {
            components: Some("Fedora".into()),
            ..Default::default()
        })
        .await;
        assert_eq!(frames[0].payload, "anaconda\nkernel\n");

        let (_, frames) = info(InfoArgs {
            components: Some("Fedora".into()),
            active_components: true,
            ..Default::default()
        })
        .await;
        assert_eq!(frames[0].payload, "kernel\n");
    }

    #[tokio::test]
    async fn test_component_owners() {
        let (_, frames) = info(InfoArgs {
            component_owners: Some("Fedora".into()),
            ..Default::default()
        })
        .await;
        assert_eq!(
            frames[0].payload,
            "anaconda: installer@example.com\nkernel: kernel-maint@example.com\n"
        );
    }

    #[tokio::test]
    async fn test_versions_keep_server_order() {
        let (_, frames) = info(InfoArgs {
            versions: Some("Fedora".into()),
            ..Default::default()
        })
        .await;
        // A version without a name still gets its line.
        assert_eq!(frames[0].payload, "rawhide\n\n40\n");
    }

    #[tokio::test]
    async fn test_unknown_product() {
        let (result, frames) = info(InfoArgs {
            versions: Some("Nope".into()),
            ..Default::default()
        })
        .await;
        assert!(matches!(result, Err(MiError::Usage(_))));
        assert!(frames.is_empty());
    }
}
