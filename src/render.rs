//src/render.rs

use std::fmt::Write as FmtWrite;

use crate::annotate::AnnotationMap;
use crate::error::Result;
use crate::tree::TaxTree;

/// Draws an annotated tree into some image format.
pub trait Renderer {
    fn render(&self, tree: &TaxTree, annotations: &AnnotationMap) -> Result<Vec<u8>>;
    /// File extension of the produced artifact, without the dot.
    fn extension(&self) -> &'static str;
}

/// The two pie slices for a ratio: matched share and the rest, clamped to 0..=100.
pub fn pie_slices(ratio_percent: f64) -> [f64; 2] {
    let matched = ratio_percent.clamp(0.0, 100.0);
    [matched, 100.0 - matched]
}

const MATCHED_COLOR: &str = "green";
const REST_COLOR: &str = "lightgray";

/// Rectangular cladogram with a pie next to every annotated leaf.
#[derive(Debug, Clone)]
pub struct SvgRenderer {
    pub row_height: f64,
    pub level_width: f64,
    pub pie_radius: f64,
    pub font_size: f64,
    pub margin: f64,
}

impl Default for SvgRenderer {
    fn default() -> Self {
        Self {
            row_height: 28.0,
            level_width: 40.0,
            pie_radius: 10.0,
            font_size: 13.0,
            margin: 20.0,
        }
    }
}

impl SvgRenderer {
    /// (x, y) for every node: leaves get consecutive rows, parents sit midway.
    fn layout(&self, tree: &TaxTree) -> Vec<(f64, f64)> {
        let mut pos = vec![(0.0, 0.0); tree.len()];
        let mut row = 0usize;
        self.place(tree, tree.root(), &mut row, &mut pos);
        pos
    }

    fn place(&self, tree: &TaxTree, idx: usize, row: &mut usize, pos: &mut [(f64, f64)]) -> f64 {
        let node = tree.node(idx);
        let x = self.margin + tree.depth(idx) as f64 * self.level_width;
        let y = if node.is_leaf() {
            let y = self.margin + (*row as f64 + 0.5) * self.row_height;
            *row += 1;
            y
        } else {
            let ys: Vec<f64> = node
                .children
                .iter()
                .map(|&c| self.place(tree, c, row, pos))
                .collect();
            (ys[0] + ys[ys.len() - 1]) / 2.0
        };
        pos[idx] = (x, y);
        y
    }

    fn pie(&self, out: &mut String, cx: f64, cy: f64, ratio_percent: f64) {
        let [matched, _] = pie_slices(ratio_percent);
        let r = self.pie_radius;
        writeln!(out, r#"  <circle cx="{cx:.2}" cy="{cy:.2}" r="{r:.2}" fill="{REST_COLOR}"/>"#).unwrap();

        if matched >= 100.0 {
            writeln!(out, r#"  <circle cx="{cx:.2}" cy="{cy:.2}" r="{r:.2}" fill="{MATCHED_COLOR}"/>"#).unwrap();
        } else if matched > 0.0 {
            let angle = matched / 100.0 * std::f64::consts::TAU;
            let (ex, ey) = (cx + r * angle.sin(), cy - r * angle.cos());
            let large = if matched > 50.0 { 1 } else { 0 };
            writeln!(
                out,
                r#"  <path d="M {cx:.2} {cy:.2} L {cx:.2} {top:.2} A {r:.2} {r:.2} 0 {large} 1 {ex:.2} {ey:.2} Z" fill="{MATCHED_COLOR}"/>"#,
                top = cy - r
            ).unwrap();
        }
    }
}

impl Renderer for SvgRenderer {
    fn render(&self, tree: &TaxTree, annotations: &AnnotationMap) -> Result<Vec<u8>> {
        let pos = self.layout(tree);
        let leaves = tree.leaves();

        let max_x = pos.iter().map(|p| p.0).fold(self.margin, f64::max);
        let longest = leaves.iter().map(|&i| tree.node(i).name.chars().count()).max().unwrap_or(0);
        // rough glyph width for a sans-serif font
        let label_width = longest as f64 * self.font_size * 0.6;
        let pie_x = max_x + 8.0 + label_width + self.pie_radius + 8.0;
        let width = pie_x + self.pie_radius + self.margin;
        let height = 2.0 * self.margin + leaves.len() as f64 * self.row_height;

        let mut out = String::new();
        writeln!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width:.0}" height="{height:.0}" viewBox="0 0 {width:.0} {height:.0}" font-family="sans-serif" font-size="{}">"#,
            self.font_size
        ).unwrap();

        // elbow branches
        for (idx, node) in tree.nodes().iter().enumerate() {
            let (x, y) = pos[idx];
            for &child in &node.children {
                let (cx, cy) = pos[child];
                writeln!(
                    out,
                    r#"  <path d="M {x:.2} {y:.2} V {cy:.2} H {cx:.2}" fill="none" stroke="black"/>"#
                ).unwrap();
            }
        }

        for &idx in &leaves {
            let node = tree.node(idx);
            let (x, y) = pos[idx];
            writeln!(
                out,
                r#"  <line x1="{x:.2}" y1="{y:.2}" x2="{max_x:.2}" y2="{y:.2}" stroke="lightgray" stroke-dasharray="2,2"/>"#
            ).unwrap();
            writeln!(
                out,
                r#"  <text x="{:.2}" y="{:.2}" dominant-baseline="middle">{}</text>"#,
                max_x + 8.0,
                y,
                xml_escape(&node.name)
            ).unwrap();
            if let Some(&ratio) = annotations.get(&node.name) {
                self.pie(&mut out, pie_x, y, ratio);
            }
        }

        out.push_str("</svg>\n");
        Ok(out.into_bytes())
    }

    fn extension(&self) -> &'static str {
        "svg"
    }
}

fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> TaxTree {
        let mut tree = TaxTree::with_root(40674);
        tree.add_child(0, 9606);
        tree.add_child(0, 10090);
        tree
    }

    #[test]
    fn test_pie_slices_clamp() {
        assert_eq!(pie_slices(2.0), [2.0, 98.0]);
        assert_eq!(pie_slices(250.0), [100.0, 0.0]);
        assert_eq!(pie_slices(-1.0), [0.0, 100.0]);
    }

    #[test]
    fn test_only_annotated_leaves_get_pies() {
        let mut annotations = AnnotationMap::new();
        annotations.insert("9606".to_string(), 25.0);

        let svg = String::from_utf8(SvgRenderer::default().render(&tree(), &annotations).unwrap()).unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.trim_end().ends_with("</svg>"));
        assert_eq!(svg.matches(r#"fill="lightgray""#).count(), 1);
        assert_eq!(svg.matches(r#"fill="green""#).count(), 1);
        assert!(svg.contains(">10090</text>"));
    }

    #[test]
    fn test_render_is_deterministic_and_escaped() {
        let mut annotations = AnnotationMap::new();
        annotations.insert("10090".to_string(), 100.0);
        let r = SvgRenderer::default();
        assert_eq!(
            r.render(&tree(), &annotations).unwrap(),
            r.render(&tree(), &annotations).unwrap()
        );
        assert_eq!(xml_escape("A & <B>"), "A &amp; &lt;B&gt;");
    }

    #[test]
    fn test_single_leaf_tree() {
        let svg = String::from_utf8(
            SvgRenderer::default()
                .render(&TaxTree::with_root(9606), &AnnotationMap::new())
                .unwrap(),
        )
        .unwrap();
        assert!(svg.contains(">9606</text>"));
        assert!(!svg.contains("<circle"));
    }
}
