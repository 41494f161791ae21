//! Connectivity check and resource listings
//!
//! Used to find valid image/flavor/network names before a launch.

use crate::control_plane::{CloudSummary, ControlPlane, Flavor, Image, Network};
use crate::error::OrchestratorError;

/// Default number of rows for list commands
pub const DEFAULT_LIST_LIMIT: usize = 20;

pub fn ping(control_plane: &dyn ControlPlane) -> Result<CloudSummary, OrchestratorError> {
    Ok(control_plane.ping()?)
}

pub fn images(
    control_plane: &dyn ControlPlane,
    limit: usize,
) -> Result<Vec<Image>, OrchestratorError> {
    Ok(control_plane.list_images(limit)?)
}

pub fn flavors(
    control_plane: &dyn ControlPlane,
    limit: usize,
) -> Result<Vec<Flavor>, OrchestratorError> {
    Ok(control_plane.list_flavors(limit)?)
}

pub fn networks(
    control_plane: &dyn ControlPlane,
    limit: usize,
) -> Result<Vec<Network>, OrchestratorError> {
    Ok(control_plane.list_networks(limit)?)
}

fn optional<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(|v| v.to_string()).unwrap_or_default()
}

/// Left-aligned plain-text table
fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let line = |cells: Vec<&str>| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = vec![line(headers.to_vec())];
    out.extend(rows.iter().map(|row| line(row.iter().map(String::as_str).collect())));
    out.join("\n")
}

pub fn render_images(images: &[Image]) -> String {
    let rows: Vec<Vec<String>> = images
        .iter()
        .map(|i| vec![i.name.clone(), i.id.clone()])
        .collect();
    render_table(&["NAME", "ID"], &rows)
}

pub fn render_flavors(flavors: &[Flavor]) -> String {
    let rows: Vec<Vec<String>> = flavors
        .iter()
        .map(|f| {
            vec![
                f.name.clone(),
                optional(&f.vcpus),
                optional(&f.ram),
                optional(&f.disk),
            ]
        })
        .collect();
    render_table(&["NAME", "VCPUS", "RAM(MB)", "DISK(GB)"], &rows)
}

pub fn render_networks(networks: &[Network]) -> String {
    let rows: Vec<Vec<String>> = networks
        .iter()
        .map(|n| vec![n.name.clone(), n.id.clone()])
        .collect();
    render_table(&["NAME", "ID"], &rows)
}
