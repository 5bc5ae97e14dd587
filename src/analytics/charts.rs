//! Chart artifacts for one analytics report.
//!
//! Every chart is rendered to its own PNG under the request's artifact base.
//! Rendering is per-artifact fault-tolerant: a failed chart is recorded in
//! the [`ChartSet`] and the remaining charts still render. Colors always come
//! from the shared palette so a cluster looks the same in the overlay and in
//! every chart of the same report.

use std::iter;
use std::path::{Path, PathBuf};

use log::warn;
use plotters::prelude::*;

use crate::error::{AnalyticsError, AnalyticsResult};
use crate::model::ClusterModel;
use crate::palette;
use crate::store::ArtifactPaths;

use super::{chart_err, AnalyticsReport, Distribution, Projection2d, RegionClassifier, SilhouetteReport};

/// Grid resolution for the filled decision regions.
const REGION_STEPS: usize = 100;
/// Neighbors consulted for each region cell.
const REGION_NEIGHBORS: usize = 5;

/// Rendered chart files for one report, one `Result` per artifact.
#[derive(Debug, Clone)]
pub struct ChartSet {
    pub legend: AnalyticsResult<PathBuf>,
    pub distribution: AnalyticsResult<PathBuf>,
    pub pie: AnalyticsResult<PathBuf>,
    pub silhouette: AnalyticsResult<PathBuf>,
    pub pca: AnalyticsResult<PathBuf>,
    pub embedding: AnalyticsResult<PathBuf>,
    pub heatmap: AnalyticsResult<PathBuf>,
}

/// Render every chart the report's numbers allow. Numeric failures carry
/// over into the matching chart slot; chart failures are logged and recorded.
pub fn render_all(report: &AnalyticsReport, model: &ClusterModel, paths: &ArtifactPaths) -> ChartSet {
    let set = ChartSet {
        legend: checked(render_legend(&paths.legend(), model.k), paths.legend()),
        distribution: checked(
            render_distribution(&paths.distribution(), &report.distribution),
            paths.distribution(),
        ),
        pie: checked(render_pie(&paths.pie(), &report.distribution), paths.pie()),
        silhouette: report.silhouette.as_ref().map_err(Clone::clone).and_then(|s| {
            checked(
                render_silhouette(&paths.silhouette(), s, &report.sample_labels, model.k),
                paths.silhouette(),
            )
        }),
        pca: report.pca.as_ref().map_err(Clone::clone).and_then(|p| {
            checked(
                render_projection(&paths.pca(), "PCA Visualization with Regions", p, &report.sample_labels),
                paths.pca(),
            )
        }),
        embedding: report.embedding.as_ref().map_err(Clone::clone).and_then(|p| {
            checked(
                render_projection(
                    &paths.embedding(),
                    "t-SNE Visualization with Regions",
                    p,
                    &report.sample_labels,
                ),
                paths.embedding(),
            )
        }),
        heatmap: checked(render_heatmap(&paths.heatmap(), &model.centers), paths.heatmap()),
    };

    for (name, slot) in [
        ("legend", &set.legend),
        ("distribution", &set.distribution),
        ("pie", &set.pie),
        ("silhouette", &set.silhouette),
        ("pca", &set.pca),
        ("embedding", &set.embedding),
        ("heatmap", &set.heatmap),
    ] {
        if let Err(e) = slot {
            warn!("Chart '{}' not rendered: {}", name, e);
        }
    }
    set
}

fn checked(result: AnalyticsResult<()>, path: PathBuf) -> AnalyticsResult<PathBuf> {
    result.map(|()| path)
}

fn chart_color(label: usize) -> AnalyticsResult<RGBColor> {
    let [r, g, b] = palette::color(label).map_err(chart_err)?;
    Ok(RGBColor(r, g, b))
}

fn render_legend(path: &Path, k: usize) -> AnalyticsResult<()> {
    let height = 40 * k as u32 + 30;
    let root = BitMapBackend::new(path, (360, height)).into_drawing_area();
    root.fill(&WHITE).map_err(chart_err)?;

    for label in 0..k {
        let y = 15 + 40 * label as i32;
        let color = chart_color(label)?;
        root.draw(&Rectangle::new([(20, y), (56, y + 24)], color.filled()))
            .map_err(chart_err)?;
        root.draw(&Text::new(
            format!("Cluster {label}"),
            (70, y + 4),
            ("sans-serif", 20),
        ))
        .map_err(chart_err)?;
    }
    root.present().map_err(chart_err)
}

fn render_distribution(path: &Path, distribution: &Distribution) -> AnalyticsResult<()> {
    let k = distribution.counts.len();
    let max_count = distribution.counts.iter().copied().max().unwrap_or(0);
    let root = BitMapBackend::new(path, (800, 480)).into_drawing_area();
    root.fill(&WHITE).map_err(chart_err)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .caption("Cluster Distribution", ("sans-serif", 28.0))
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 50)
        .build_cartesian_2d(
            -0.5f64..(k as f64 - 0.5),
            0f64..(max_count as f64 * 1.1).max(1.0),
        )
        .map_err(chart_err)?;
    chart
        .configure_mesh()
        .x_desc("Cluster ID")
        .y_desc("Count")
        .x_labels(k)
        .draw()
        .map_err(chart_err)?;

    for (label, count) in distribution.present() {
        let color = chart_color(label)?;
        let bar = Rectangle::new(
            [
                (label as f64 - 0.4, 0.0),
                (label as f64 + 0.4, count as f64),
            ],
            color.filled(),
        );
        chart.draw_series(iter::once(bar)).map_err(chart_err)?;
    }
    root.present().map_err(chart_err)
}

fn render_pie(path: &Path, distribution: &Distribution) -> AnalyticsResult<()> {
    let root = BitMapBackend::new(path, (640, 640)).into_drawing_area();
    root.fill(&WHITE).map_err(chart_err)?;
    root.draw(&Text::new("Cluster Share", (240, 12), ("sans-serif", 28)))
        .map_err(chart_err)?;

    let (cx, cy, radius) = (320.0f64, 340.0f64, 230.0f64);
    let total = distribution.total.max(1) as f64;
    let mut angle = -90.0f64;

    for (label, count) in distribution.present() {
        let sweep = count as f64 / total * 360.0;
        let color = chart_color(label)?;

        // Wedge as a fan polygon with one-degree arc segments.
        let mut points = vec![(cx as i32, cy as i32)];
        let steps = (sweep.ceil() as usize).max(1);
        for s in 0..=steps {
            let theta = (angle + sweep * s as f64 / steps as f64).to_radians();
            points.push((
                (cx + radius * theta.cos()) as i32,
                (cy + radius * theta.sin()) as i32,
            ));
        }
        root.draw(&Polygon::new(points, color.filled()))
            .map_err(chart_err)?;

        let mid = (angle + sweep / 2.0).to_radians();
        let pct = distribution.percentage(label);
        root.draw(&Text::new(
            format!("Cluster {label}: {pct:.1}%"),
            (
                (cx + radius * 0.62 * mid.cos()) as i32 - 40,
                (cy + radius * 0.62 * mid.sin()) as i32,
            ),
            ("sans-serif", 16),
        ))
        .map_err(chart_err)?;

        angle += sweep;
    }
    root.present().map_err(chart_err)
}

fn render_silhouette(
    path: &Path,
    report: &SilhouetteReport,
    sample_labels: &[usize],
    k: usize,
) -> AnalyticsResult<()> {
    let root = BitMapBackend::new(path, (800, 480)).into_drawing_area();
    root.fill(&WHITE).map_err(chart_err)?;

    let x_min = report
        .values
        .iter()
        .cloned()
        .fold(0.0f64, f64::min)
        .min(-0.1);
    let y_max = (report.values.len() + 10 * (k + 1)) as f64;

    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .caption(
            format!("Silhouette Plot (Avg Score: {:.2})", report.average),
            ("sans-serif", 28.0),
        )
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 50)
        .build_cartesian_2d(x_min..1.0f64, 0f64..y_max)
        .map_err(chart_err)?;
    chart
        .configure_mesh()
        .x_desc("Silhouette Coefficient Values")
        .y_desc("Cluster Label")
        .draw()
        .map_err(chart_err)?;

    // Stacked horizontal bars, one band per cluster, sorted within the band.
    let mut y_lower = 10.0f64;
    for label in 0..k {
        let mut values: Vec<f64> = report
            .values
            .iter()
            .zip(sample_labels)
            .filter(|(_, &l)| l == label)
            .map(|(&v, _)| v)
            .collect();
        if values.is_empty() {
            continue;
        }
        values.sort_by(|a, b| a.total_cmp(b));
        let color = chart_color(label)?;
        for (offset, v) in values.iter().enumerate() {
            let y = y_lower + offset as f64;
            let bar = Rectangle::new([(0.0, y), (*v, y + 1.0)], color.mix(0.7).filled());
            chart.draw_series(iter::once(bar)).map_err(chart_err)?;
        }
        chart
            .draw_series(iter::once(Text::new(
                format!("{label}"),
                (x_min + 0.02, y_lower + values.len() as f64 / 2.0),
                ("sans-serif", 16),
            )))
            .map_err(chart_err)?;
        y_lower += values.len() as f64 + 10.0;
    }

    // Average marker.
    chart
        .draw_series(LineSeries::new(
            [(report.average, 0.0), (report.average, y_max)],
            RED.stroke_width(2),
        ))
        .map_err(chart_err)?;
    root.present().map_err(chart_err)
}

fn render_projection(
    path: &Path,
    title: &str,
    projection: &Projection2d,
    sample_labels: &[usize],
) -> AnalyticsResult<()> {
    let root = BitMapBackend::new(path, (800, 640)).into_drawing_area();
    root.fill(&WHITE).map_err(chart_err)?;

    let (min, max) = projection.bounds();
    let (x_min, x_max) = (min[0] - 1.0, max[0] + 1.0);
    let (y_min, y_max) = (min[1] - 1.0, max[1] + 1.0);

    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .caption(title, ("sans-serif", 28.0))
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 50)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)
        .map_err(chart_err)?;
    chart.configure_mesh().draw().map_err(chart_err)?;

    // Filled decision regions from a nearest-neighbor vote over the
    // projected points. Diagnostic background only.
    let classifier = RegionClassifier::fit(&projection.points, sample_labels, REGION_NEIGHBORS);
    let x_step = (x_max - x_min) / REGION_STEPS as f64;
    let y_step = (y_max - y_min) / REGION_STEPS as f64;
    for i in 0..REGION_STEPS {
        for j in 0..REGION_STEPS {
            let x = x_min + x_step * i as f64;
            let y = y_min + y_step * j as f64;
            let label = classifier.predict([x + x_step / 2.0, y + y_step / 2.0]);
            let color = chart_color(label)?;
            let cell = Rectangle::new(
                [(x, y), (x + x_step, y + y_step)],
                color.mix(0.2).filled(),
            );
            chart.draw_series(iter::once(cell)).map_err(chart_err)?;
        }
    }

    let k = sample_labels.iter().copied().max().unwrap_or(0) + 1;
    for label in 0..k {
        let color = chart_color(label)?;
        let points: Vec<(f64, f64)> = projection
            .points
            .iter()
            .zip(sample_labels)
            .filter(|(_, &l)| l == label)
            .map(|(p, _)| (p[0], p[1]))
            .collect();
        if points.is_empty() {
            continue;
        }
        chart
            .draw_series(
                points
                    .iter()
                    .map(|&(x, y)| Circle::new((x, y), 3, color.filled())),
            )
            .map_err(chart_err)?
            .label(format!("Cluster {label}"))
            .legend(move |(x, y)| Circle::new((x, y), 3, color.filled()));
    }
    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.85))
        .border_style(BLACK)
        .draw()
        .map_err(chart_err)?;
    root.present().map_err(chart_err)
}

fn render_heatmap(path: &Path, centers: &[Vec<f32>]) -> AnalyticsResult<()> {
    let k = centers.len();
    let c = centers.first().map(Vec::len).unwrap_or(0);
    if k == 0 || c == 0 {
        return Err(AnalyticsError::Skipped("no cluster centers".into()));
    }

    let root = BitMapBackend::new(path, (1000, (60 * k as u32 + 140).max(240))).into_drawing_area();
    root.fill(&WHITE).map_err(chart_err)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .caption("Cluster Centers Heatmap (Features)", ("sans-serif", 28.0))
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 50)
        .build_cartesian_2d(0f64..c as f64, 0f64..k as f64)
        .map_err(chart_err)?;
    chart
        .configure_mesh()
        .x_desc("Feature Index")
        .y_desc("Cluster ID")
        .disable_mesh()
        .draw()
        .map_err(chart_err)?;

    let (mut lo, mut hi) = (f32::INFINITY, f32::NEG_INFINITY);
    for row in centers {
        for &v in row {
            lo = lo.min(v);
            hi = hi.max(v);
        }
    }
    let span = (hi - lo).max(1e-12);

    for (row_idx, row) in centers.iter().enumerate() {
        for (col_idx, &v) in row.iter().enumerate() {
            let norm = ((v - lo) / span) as f64;
            let cell = Rectangle::new(
                [
                    (col_idx as f64, row_idx as f64),
                    (col_idx as f64 + 1.0, row_idx as f64 + 1.0),
                ],
                gradient_color(norm).filled(),
            );
            chart.draw_series(iter::once(cell)).map_err(chart_err)?;
        }
    }
    root.present().map_err(chart_err)
}

fn gradient_color(norm: f64) -> RGBColor {
    let clamped = norm.clamp(0.0, 1.0);
    let r = (255.0 * clamped) as u8;
    let g = (255.0 * (1.0 - (clamped - 0.5).abs() * 2.0).max(0.0)) as u8;
    let b = (255.0 * (1.0 - clamped)) as u8;
    RGBColor(r, g, b)
}
