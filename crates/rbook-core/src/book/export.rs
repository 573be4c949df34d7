//! HTML 出力
//!
//! 探索数が閾値以上のノードごとに1ページを書き出す。ページには局面・集約値と、
//! 効用（勝敗値 + スコア）に方策確率の緩い加点を足した順で並べた手を載せる。

use super::error::BookResult;
use super::graph::Book;
use super::node::{BookNode, NodeIdx};
use super::values::RecursiveBookValues;
use super::view::SymBookNode;
use crate::position::GameBoard;
use crate::types::{Loc, Player, Symmetry};
use chrono::Local;
use log::info;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

const BOOK_CSS: &str = r#"body { font-family: sans-serif; margin: 2em; }
table { border-collapse: collapse; }
td, th { border: 1px solid #999; padding: 2px 6px; text-align: right; }
table.board td { width: 1.4em; height: 1.4em; text-align: center; border: 1px solid #ccc; }
td.black { background: #333; color: #fff; }
td.white { background: #fff; color: #000; border-color: #333; }
td.inbook { background: #cde; }
.dev { color: #777; }
"#;

const BOOK_JS: &str = r#"document.addEventListener("keydown", function (e) {
  if (e.key === "u" || e.key === "Backspace") {
    var up = document.getElementById("parent-link");
    if (up) { window.location = up.href; }
  }
});
"#;

/// HTML 出力の設定
#[derive(Debug, Clone)]
pub struct HtmlExportOptions<'a> {
    pub rules_label: &'a str,
    pub rules_link: &'a str,
    /// コストなどの内部値も表示する
    pub dev_mode: bool,
    /// 集約した探索数がこれ未満のノードは出力しない
    pub min_visits: f64,
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn page_name(node: &BookNode) -> String {
    format!("{}.html", node.hash)
}

/// 並び替え用の効用（手番側から見た値）
///
/// 方策確率の加点は `policy_boost_soft_utility_scale` で頭打ちになる。
pub(crate) fn sorting_utility(
    pla: Player,
    values: &RecursiveBookValues,
    raw_policy: f64,
    utility_per_score: f64,
    policy_boost_soft_utility_scale: f64,
    utility_per_policy_for_sorting: f64,
) -> f64 {
    let utility = pla.sign() * values.utility(utility_per_score);
    let linear = raw_policy.max(0.0) * utility_per_policy_for_sorting;
    let boost = if policy_boost_soft_utility_scale > 0.0 {
        policy_boost_soft_utility_scale * (1.0 - (-linear / policy_boost_soft_utility_scale).exp())
    } else {
        linear
    };
    utility + boost
}

impl<B: GameBoard> Book<B> {
    /// 盤面を HTML の表にする（book にある手の位置を強調）
    fn render_board(&self, idx: NodeIdx, out: &mut String) {
        let view = self.view(SymBookNode::new(idx, Symmetry::IDENTITY));
        let Ok(hist) = view.board_history_reaching_here() else {
            out.push_str("<p>(board unavailable)</p>\n");
            return;
        };
        let board = hist.board();
        let node = self.node(idx);
        out.push_str("<table class=\"board\">\n");
        for y in 0..board.height() {
            out.push_str("<tr>");
            for x in 0..board.width() {
                let loc = Loc::point(x as u8, y as u8);
                let (class, text) = match board.stone_at(x, y) {
                    Some(Player::Black) => ("black", "X"),
                    Some(Player::White) => ("white", "O"),
                    None if node.moves.contains_key(&loc) => ("inbook", "+"),
                    None => ("", ""),
                };
                let _ = write!(out, "<td class=\"{class}\" title=\"{loc}\">{text}</td>");
            }
            out.push_str("</tr>\n");
        }
        out.push_str("</table>\n");
    }

    fn render_page(&self, idx: NodeIdx, exported: &[bool], options: &HtmlExportOptions<'_>, timestamp: &str) -> String {
        let node = self.node(idx);
        let p = &self.params;
        let rv = &node.recursive_values;
        let mut out = String::new();

        let _ = writeln!(out, "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">");
        let _ = writeln!(out, "<title>Book {}</title>", node.hash);
        out.push_str("<link rel=\"stylesheet\" href=\"book.css\"><script src=\"book.js\"></script>\n</head><body>\n");
        let _ = writeln!(
            out,
            "<p>Rules: <a href=\"{}\">{}</a></p>",
            escape_html(options.rules_link),
            escape_html(options.rules_label)
        );

        let parent_page = node
            .best_parent_idx
            .and_then(|i| node.parents.get(i))
            .and_then(|(h, _)| self.idx_of(h))
            .filter(|&pi| exported[pi]);
        if let Some(pi) = parent_page {
            let _ = writeln!(out, "<p><a id=\"parent-link\" href=\"{}\">Parent</a></p>", page_name(self.node(pi)));
        }

        let _ = writeln!(out, "<p>{} to move, depth {}</p>", node.pla, node.min_depth_from_root);
        self.render_board(idx, &mut out);

        let _ = writeln!(
            out,
            "<p>Win/loss {:.3} [{:.3}, {:.3}] Score {:.2} [{:.2}, {:.2}] Sharp {:.2} Visits {:.0}</p>",
            rv.win_loss_value, rv.win_loss_lcb, rv.win_loss_ucb, rv.score_mean, rv.score_lcb, rv.score_ucb,
            rv.sharp_score_mean, rv.visits
        );

        // 手の一覧（未展開の選択肢を含む）
        let mut rows: Vec<(f64, String)> = Vec::new();
        for (&loc, edge) in &node.moves {
            let Some(child_idx) = self.idx_of(&edge.hash) else {
                continue;
            };
            let child = self.node(child_idx);
            let cv = &child.recursive_values;
            let key = sorting_utility(
                node.pla,
                cv,
                edge.raw_policy,
                p.utility_per_score,
                p.policy_boost_soft_utility_scale,
                p.utility_per_policy_for_sorting,
            );
            let label = if exported[child_idx] {
                format!("<a href=\"{}\">{loc}</a>", page_name(child))
            } else {
                loc.to_string()
            };
            let mut row = format!(
                "<tr><td>{label}</td><td>{:.1}%</td><td>{:.3}</td><td>{:.2}</td><td>{:.0}</td>",
                edge.raw_policy * 100.0,
                cv.win_loss_value,
                cv.score_mean,
                cv.visits
            );
            if options.dev_mode {
                let _ = write!(
                    row,
                    "<td class=\"dev\">{:.3}</td><td class=\"dev\">{}</td>",
                    edge.cost_from_root,
                    if edge.is_wlpv { "pv" } else { "" }
                );
            }
            row.push_str("</tr>");
            rows.push((key, row));
        }
        let this_values = self.this_node_values(node);
        let raw = &node.this_values_not_in_book;
        let mut other = format!(
            "<tr><td>other</td><td>{:.1}%</td><td>{:.3}</td><td>{:.2}</td><td>{:.0}</td>",
            raw.max_policy * 100.0,
            this_values.win_loss_value,
            this_values.score_mean,
            raw.visits
        );
        if options.dev_mode {
            let _ = write!(
                other,
                "<td class=\"dev\">{:.3}</td><td class=\"dev\">{}</td>",
                node.total_expansion_cost(),
                if node.expansion_is_wlpv { "pv" } else { "" }
            );
        }
        other.push_str("</tr>");
        let other_key = sorting_utility(
            node.pla,
            &this_values,
            raw.max_policy,
            p.utility_per_score,
            p.policy_boost_soft_utility_scale,
            p.utility_per_policy_for_sorting,
        );
        rows.push((other_key, other));
        rows.sort_by(|a, b| b.0.total_cmp(&a.0));

        out.push_str("<table>\n<tr><th>Move</th><th>Policy</th><th>Win/loss</th><th>Score</th><th>Visits</th>");
        if options.dev_mode {
            out.push_str("<th>Cost</th><th>WLPV</th>");
        }
        out.push_str("</tr>\n");
        for (_, row) in rows {
            out.push_str(&row);
            out.push('\n');
        }
        out.push_str("</table>\n");
        let _ = writeln!(out, "<p class=\"dev\">Generated {timestamp}</p>\n</body></html>");
        out
    }

    /// `dir` に HTML を書き出し、書いたファイル数を返す
    pub fn export_to_html_dir<P: AsRef<Path>>(&self, dir: P, options: &HtmlExportOptions<'_>) -> BookResult<usize> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();

        let exported: Vec<bool> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| idx == self.root || node.recursive_values.visits >= options.min_visits)
            .collect();

        let mut num_files = 0usize;
        fs::write(dir.join("book.css"), BOOK_CSS)?;
        fs::write(dir.join("book.js"), BOOK_JS)?;
        num_files += 2;

        for idx in (0..self.nodes.len()).filter(|&i| exported[i]) {
            let page = self.render_page(idx, &exported, options, &timestamp);
            fs::write(dir.join(page_name(self.node(idx))), page)?;
            num_files += 1;
        }

        let root_page = page_name(self.node(self.root));
        let index = format!(
            "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><meta http-equiv=\"refresh\" content=\"0; url={root_page}\"></head>\
             <body><a href=\"{root_page}\">Book root</a></body></html>\n"
        );
        fs::write(dir.join("index.html"), index)?;
        num_files += 1;

        info!("Exported {} files to {}", num_files, dir.display());
        Ok(num_files)
    }
}
