//! Headless SVG rendering
//!
//! Small line-chart writer used for episode renders and training artifacts.

use std::fmt::{self, Write as _};
use std::path::Path;

use crate::error::Result;

const PANEL_GAP: f64 = 40.0;
const MARGIN_LEFT: f64 = 70.0;
const MARGIN_RIGHT: f64 = 20.0;
const MARGIN_TOP: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 30.0;

/// How a render should be delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// Log a text summary
    #[default]
    Human,
    /// Produce an SVG document
    Svg,
}

/// Direction of a trade marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Buy,
    Sell,
}

impl MarkerKind {
    fn color(self) -> &'static str {
        match self {
            MarkerKind::Buy => "#2ca02c",
            MarkerKind::Sell => "#d62728",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Marker {
    pub x: f64,
    pub y: f64,
    pub kind: MarkerKind,
}

/// One line in a panel
#[derive(Debug, Clone)]
pub struct Series {
    pub name: String,
    pub color: String,
    pub points: Vec<(f64, f64)>,
}

impl Series {
    pub fn new(name: impl Into<String>, color: impl Into<String>, points: Vec<(f64, f64)>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
            points,
        }
    }

    /// Series over consecutive integer x values
    pub fn indexed(name: impl Into<String>, color: impl Into<String>, values: &[f64]) -> Self {
        let points = values
            .iter()
            .enumerate()
            .map(|(i, v)| (i as f64, *v))
            .collect();
        Self::new(name, color, points)
    }
}

/// A stacked sub-plot
#[derive(Debug, Clone, Default)]
pub struct ChartPanel {
    pub title: String,
    pub series: Vec<Series>,
    pub markers: Vec<Marker>,
}

impl ChartPanel {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_series(mut self, series: Series) -> Self {
        self.series.push(series);
        self
    }

    pub fn with_markers(mut self, markers: Vec<Marker>) -> Self {
        self.markers = markers;
        self
    }

    fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        let points = self
            .series
            .iter()
            .flat_map(|s| s.points.iter().copied())
            .chain(self.markers.iter().map(|m| (m.x, m.y)))
            .filter(|(x, y)| x.is_finite() && y.is_finite());

        let mut bounds: Option<(f64, f64, f64, f64)> = None;
        for (x, y) in points {
            bounds = Some(match bounds {
                None => (x, x, y, y),
                Some((x0, x1, y0, y1)) => (x0.min(x), x1.max(x), y0.min(y), y1.max(y)),
            });
        }
        bounds.map(|(x0, x1, y0, y1)| {
            let (x0, x1) = if x1 > x0 { (x0, x1) } else { (x0 - 0.5, x0 + 0.5) };
            let (y0, y1) = if y1 > y0 { (y0, y1) } else { (y0 - 0.5, y0 + 0.5) };
            (x0, x1, y0, y1)
        })
    }
}

/// Vertically stacked panels rendered to a single SVG document
#[derive(Debug, Clone)]
pub struct SvgChart {
    pub title: String,
    pub width: f64,
    pub panel_height: f64,
    pub panels: Vec<ChartPanel>,
}

impl SvgChart {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            width: 960.0,
            panel_height: 260.0,
            panels: Vec::new(),
        }
    }

    pub fn with_panel(mut self, panel: ChartPanel) -> Self {
        self.panels.push(panel);
        self
    }

    pub fn height(&self) -> f64 {
        let n = self.panels.len().max(1) as f64;
        MARGIN_TOP + n * self.panel_height + (n - 1.0) * PANEL_GAP + MARGIN_BOTTOM
    }

    pub fn to_svg(&self) -> String {
        let mut out = String::new();
        match self.render_into(&mut out) {
            Ok(()) => out,
            Err(_) => String::new(),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_svg())?;
        Ok(())
    }

    fn render_into(&self, out: &mut String) -> fmt::Result {
        let (width, height) = (self.width, self.height());
        writeln!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}">"#
        )?;
        writeln!(out, r#"<rect width="100%" height="100%" fill="white"/>"#)?;
        writeln!(
            out,
            r#"<text x="{}" y="20" font-family="sans-serif" font-size="16" text-anchor="middle">{}</text>"#,
            width / 2.0,
            escape(&self.title)
        )?;

        let plot_w = width - MARGIN_LEFT - MARGIN_RIGHT;
        for (i, panel) in self.panels.iter().enumerate() {
            let top = MARGIN_TOP + i as f64 * (self.panel_height + PANEL_GAP);
            self.render_panel(out, panel, top, plot_w)?;
        }

        writeln!(out, "</svg>")
    }

    fn render_panel(&self, out: &mut String, panel: &ChartPanel, top: f64, plot_w: f64) -> fmt::Result {
        let plot_h = self.panel_height - 20.0;
        let plot_top = top + 20.0;
        writeln!(
            out,
            r#"<text x="{MARGIN_LEFT}" y="{}" font-family="sans-serif" font-size="13">{}</text>"#,
            top + 12.0,
            escape(&panel.title)
        )?;
        writeln!(
            out,
            r##"<rect x="{MARGIN_LEFT}" y="{plot_top}" width="{plot_w}" height="{plot_h}" fill="none" stroke="#999"/>"##
        )?;

        let Some((x0, x1, y0, y1)) = panel.bounds() else {
            return Ok(());
        };
        let sx = |x: f64| MARGIN_LEFT + (x - x0) / (x1 - x0) * plot_w;
        let sy = |y: f64| plot_top + plot_h - (y - y0) / (y1 - y0) * plot_h;

        writeln!(
            out,
            r#"<text x="{}" y="{}" font-family="sans-serif" font-size="10" text-anchor="end">{y1:.4}</text>"#,
            MARGIN_LEFT - 4.0,
            plot_top + 10.0
        )?;
        writeln!(
            out,
            r#"<text x="{}" y="{}" font-family="sans-serif" font-size="10" text-anchor="end">{y0:.4}</text>"#,
            MARGIN_LEFT - 4.0,
            plot_top + plot_h
        )?;

        for (legend_row, series) in panel.series.iter().enumerate() {
            let path: Vec<String> = series
                .points
                .iter()
                .filter(|(x, y)| x.is_finite() && y.is_finite())
                .map(|(x, y)| format!("{:.2},{:.2}", sx(*x), sy(*y)))
                .collect();
            if !path.is_empty() {
                writeln!(
                    out,
                    r#"<polyline fill="none" stroke="{}" stroke-width="1.5" points="{}"/>"#,
                    escape(&series.color),
                    path.join(" ")
                )?;
            }
            writeln!(
                out,
                r#"<text x="{}" y="{}" font-family="sans-serif" font-size="11" fill="{}" text-anchor="end">{}</text>"#,
                MARGIN_LEFT + plot_w - 6.0,
                plot_top + 14.0 + legend_row as f64 * 14.0,
                escape(&series.color),
                escape(&series.name)
            )?;
        }

        for marker in &panel.markers {
            if !(marker.x.is_finite() && marker.y.is_finite()) {
                continue;
            }
            let (cx, cy) = (sx(marker.x), sy(marker.y));
            let points = match marker.kind {
                MarkerKind::Buy => format!("{cx:.2},{:.2} {:.2},{:.2} {:.2},{:.2}", cy - 5.0, cx - 4.0, cy + 3.0, cx + 4.0, cy + 3.0),
                MarkerKind::Sell => format!("{cx:.2},{:.2} {:.2},{:.2} {:.2},{:.2}", cy + 5.0, cx - 4.0, cy - 3.0, cx + 4.0, cy - 3.0),
            };
            writeln!(out, r#"<polygon points="{points}" fill="{}"/>"#, marker.kind.color())?;
        }

        Ok(())
    }
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
