use anyhow::Context;
use panoview_core::events::SELECT_OBJECT;
use panoview_core::{ConsoleColor, ConsoleScope, Mesh, Points, ViewerConfig};
use serde_json::{Map, Value, json};

use crate::cli::DemoOpts;

const TETRA: &str = "tetra";
const STARS: &str = "stars";

fn tetrahedron() -> Mesh {
    Mesh::new(
        vec![
            [1.0, 1.0, 1.0],
            [-1.0, -1.0, 1.0],
            [-1.0, 1.0, -1.0],
            [1.0, -1.0, -1.0],
        ],
        vec![[0, 1, 2], [0, 3, 1], [0, 2, 3], [1, 3, 2]],
    )
}

fn star_field() -> Points {
    let points = (0..64u16)
        .map(|i| {
            let t = f32::from(i) * 0.7;
            [3.0 * t.cos(), 0.05 * f32::from(i) - 1.6, 3.0 * t.sin()]
        })
        .collect();
    Points::new(points)
}

fn load_config(opts: DemoOpts) -> anyhow::Result<ViewerConfig> {
    let mut config = match &opts.config {
        Some(path) => ViewerConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => ViewerConfig::default(),
    };
    if opts.url.is_some() {
        config.server_url = opts.url;
    }
    if opts.viewer_id.is_some() {
        config.viewer_id = opts.viewer_id;
    }
    config.interactive_console |= opts.interactive_console;
    Ok(config)
}

fn single(field: &str, value: Value) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(field.to_owned(), value);
    map
}

pub async fn cmd_demo(opts: DemoOpts) -> anyhow::Result<()> {
    let config = load_config(opts)?;
    let conn = panoview_ws::connect(config)
        .await
        .context("failed to connect viewer")?;
    let session = conn.session();
    tracing::info!(viewer_id = %session.viewer_id(), url = conn.url(), "demo viewer connected");

    session.add_mesh(TETRA, tetrahedron())?;
    session.add_points(STARS, star_field())?;
    session.look_at([4.0, 3.0, 4.0], [0.0, 0.0, 0.0]);

    session.slider("scale", 0.1, 3.0, 0.1, 1.0, |s, value| {
        let k = value.as_f64().unwrap_or(1.0);
        s.update_object(TETRA, &single("scale", json!([k, k, k])))?;
        Ok(())
    })?;
    session.checkbox("show stars", true, |s, value| {
        let visible = value.as_bool().unwrap_or(true);
        s.update_object(STARS, &single("visible", json!(visible)))?;
        Ok(())
    })?;
    session.button("hello", |s, _| {
        s.print_colored("hello from the demo viewer", Some(ConsoleColor::Green), "\n");
        Ok(())
    })?;
    session.label("drag the slider to resize the tetrahedron", None)?;

    session.on(SELECT_OBJECT, |args| {
        let selected = args.first().and_then(Value::as_str).unwrap_or("<none>");
        tracing::info!(selected, "object selected");
        Ok(())
    });

    if session.console().is_enabled() {
        let scope = ConsoleScope::isolated(session.console().lua())?;
        scope.set("tetra", TETRA)?;
        scope.set("stars", STARS)?;
        session.set_console_scope(scope)?;
        session.capture_prints();
    }

    conn.hold().await;
    conn.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> DemoOpts {
        DemoOpts {
            url: None,
            viewer_id: None,
            interactive_console: false,
            config: None,
        }
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("viewer.toml");
        std::fs::write(&path, "viewer_id = \"from-file\"\nserver_url = \"host:1\"\n")
            .expect("write");

        let config = load_config(DemoOpts {
            viewer_id: Some("from-flag".into()),
            config: Some(path),
            ..opts()
        })
        .expect("config");
        assert_eq!(config.viewer_id.as_deref(), Some("from-flag"));
        assert_eq!(config.server_url.as_deref(), Some("host:1"));
    }

    #[test]
    fn missing_config_file_is_error() {
        let err = load_config(DemoOpts {
            config: Some("/nonexistent/panoview.toml".into()),
            ..opts()
        });
        assert!(err.is_err());
    }

    #[test]
    fn demo_geometry_is_well_formed() {
        let mesh = tetrahedron();
        assert!(mesh.faces.iter().flatten().all(|&i| (i as usize) < mesh.vertices.len()));
        assert_eq!(star_field().points.len(), 64);
    }
}
