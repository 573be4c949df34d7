//! rbook: 定跡ファイルの作成・確認・係数調整・HTML 出力

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use rbook_core::book::{Book, BookParams, HashOverrides, HtmlExportOptions, SymBookNode, LATEST_BOOK_VERSION};
use rbook_core::position::{PlacementBoard, Rules, ScoringRule};
use rbook_core::types::Player;
use serde::Deserialize;

#[derive(Parser, Debug)]
#[command(name = "rbook", author, version, about = "Opening book tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 根だけの book を作成して保存する
    New(NewArgs),
    /// ノード数・根の評価値・展開候補を表示する
    Info(InfoArgs),
    /// 次に展開すべきノードを手順付きで表示する
    Next(NextArgs),
    /// TOML の係数・上書きテーブルを適用して保存し直す
    SetParams(SetParamsArgs),
    /// HTML を出力する
    ExportHtml(ExportHtmlArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ScoringArg {
    Area,
    Territory,
}

impl From<ScoringArg> for ScoringRule {
    fn from(arg: ScoringArg) -> Self {
        match arg {
            ScoringArg::Area => ScoringRule::Area,
            ScoringArg::Territory => ScoringRule::Territory,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PlayerArg {
    Black,
    White,
}

impl From<PlayerArg> for Player {
    fn from(arg: PlayerArg) -> Self {
        match arg {
            PlayerArg::Black => Player::Black,
            PlayerArg::White => Player::White,
        }
    }
}

#[derive(clap::Args, Debug)]
struct NewArgs {
    /// 出力先（.gz なら gzip）
    #[arg(long, value_name = "FILE")]
    out: PathBuf,
    /// 盤の横幅
    #[arg(long, default_value_t = 9)]
    width: usize,
    /// 盤の縦幅
    #[arg(long, default_value_t = 9)]
    height: usize,
    #[arg(long, value_enum, default_value_t = ScoringArg::Area)]
    scoring: ScoringArg,
    #[arg(long, default_value_t = 7.0)]
    komi: f32,
    /// 初期局面の手番
    #[arg(long, value_enum, default_value_t = PlayerArg::Black)]
    first_player: PlayerArg,
    /// 反復判定の範囲
    #[arg(long, default_value_t = 0)]
    rep_bound: usize,
    /// スキーマバージョン
    #[arg(long, default_value_t = LATEST_BOOK_VERSION)]
    book_version: u32,
    /// 係数・上書きテーブル（TOML）
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct BookArgs {
    /// book ファイル
    #[arg(long, value_name = "FILE")]
    book: PathBuf,
    /// sharp スコアの外れ値の上限
    #[arg(long, default_value_t = 2.0)]
    sharp_score_outlier_cap: f64,
}

#[derive(clap::Args, Debug)]
struct InfoArgs {
    #[command(flatten)]
    book: BookArgs,
    /// 表示する展開候補の数
    #[arg(long, default_value_t = 5)]
    top: usize,
}

#[derive(clap::Args, Debug)]
struct NextArgs {
    #[command(flatten)]
    book: BookArgs,
    #[arg(long, default_value_t = 10)]
    count: usize,
}

#[derive(clap::Args, Debug)]
struct SetParamsArgs {
    #[command(flatten)]
    book: BookArgs,
    /// 係数・上書きテーブル（TOML）
    #[arg(long, value_name = "FILE")]
    config: PathBuf,
    /// 出力先（省略時は上書き）
    #[arg(long, value_name = "FILE")]
    out: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct ExportHtmlArgs {
    #[command(flatten)]
    book: BookArgs,
    /// 出力ディレクトリ
    #[arg(long, value_name = "DIR")]
    dir: PathBuf,
    #[arg(long, default_value = "")]
    rules_label: String,
    #[arg(long, default_value = "")]
    rules_link: String,
    /// コストなどの内部値も出力する
    #[arg(long)]
    dev_mode: bool,
    /// 集約した探索数がこれ未満のノードは出力しない
    #[arg(long, default_value_t = 0.0)]
    min_visits: f64,
}

/// 係数ファイル
///
/// `[params]` は指定したキーだけを現在の値に上書きする。
/// `[overrides]` は4つのテーブルを丸ごと置き換える。
#[derive(Deserialize, Debug, Default)]
struct ConfigFile {
    params: Option<toml::Table>,
    overrides: Option<HashOverrides>,
}

fn read_config(path: &Path) -> Result<ConfigFile> {
    let text = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

/// `base` に TOML の `[params]` を重ねる
fn merge_params(base: &BookParams, given: toml::Table) -> Result<BookParams> {
    let toml::Value::Table(mut merged) = toml::Value::try_from(base).context("failed to encode params")? else {
        bail!("params did not encode to a table");
    };
    for (key, value) in given {
        if !merged.contains_key(&key) {
            bail!("unknown parameter `{key}`");
        }
        merged.insert(key, value);
    }
    let mut params: BookParams = toml::Value::Table(merged)
        .try_into()
        .context("invalid parameter value")?;
    params.sharp_score_outlier_cap = base.sharp_score_outlier_cap;
    Ok(params)
}

fn apply_config(book: &mut Book<PlacementBoard>, config: ConfigFile) -> Result<()> {
    if let Some(given) = config.params {
        let params = merge_params(book.params(), given)?;
        book.set_params(params);
    }
    if let Some(overrides) = config.overrides {
        book.set_overrides(overrides);
    }
    book.recompute_everything();
    Ok(())
}

fn load_book(args: &BookArgs) -> Result<Book<PlacementBoard>> {
    Book::load_from_file(&args.book, args.sharp_score_outlier_cap)
        .with_context(|| format!("failed to load book {}", args.book.display()))
}

/// 根からの手順（初期局面の向き）
fn path_string(book: &Book<PlacementBoard>, handle: SymBookNode) -> String {
    match book.view(handle).board_history_reaching_here() {
        Ok(hist) => {
            let moves: Vec<String> = hist.moves().iter().map(|m| m.loc.to_string()).collect();
            if moves.is_empty() {
                "(root)".to_string()
            } else {
                moves.join(" ")
            }
        }
        Err(e) => {
            let moves: Vec<String> = e.moves.iter().map(|m| m.to_string()).collect();
            format!("(illegal replay: {})", moves.join(" "))
        }
    }
}

fn print_candidates(book: &Book<PlacementBoard>, n: usize) {
    for (rank, handle) in book.next_n_to_expand(n).into_iter().enumerate() {
        let view = book.view(handle);
        println!(
            "{:>3} cost={:.4} depth={} wl={:.3} visits={:.0} {}",
            rank + 1,
            view.total_expansion_cost(),
            view.min_depth_from_root(),
            view.recursive_values().win_loss_value,
            view.this_values_not_in_book().visits,
            path_string(book, handle)
        );
    }
}

fn run_new(args: NewArgs) -> Result<()> {
    let Some(board) = PlacementBoard::new(args.width, args.height) else {
        bail!("invalid board size {}x{}", args.width, args.height);
    };
    let rules = Rules {
        scoring_rule: args.scoring.into(),
        komi: args.komi,
    };
    let mut book = Book::new(
        args.book_version,
        board,
        rules,
        args.first_player.into(),
        args.rep_bound,
        BookParams::default(),
    )
    .context("failed to create book")?;
    if let Some(path) = &args.config {
        apply_config(&mut book, read_config(path)?)?;
    }
    book.save_to_file(&args.out)
        .with_context(|| format!("failed to save {}", args.out.display()))?;
    info!("Created book {}", book.view(book.root()).hash());
    Ok(())
}

fn run_info(args: InfoArgs) -> Result<()> {
    let book = load_book(&args.book)?;
    let root = book.view(book.root());
    let rv = root.recursive_values();
    println!("version: {}", book.book_version());
    println!("nodes: {}", book.size());
    println!("root: {}", root.hash());
    println!(
        "root values: wl={:.4} [{:.4}, {:.4}] score={:.2} [{:.2}, {:.2}] sharp={:.2} visits={:.0}",
        rv.win_loss_value, rv.win_loss_lcb, rv.win_loss_ucb, rv.score_mean, rv.score_lcb, rv.score_ucb,
        rv.sharp_score_mean, rv.visits
    );
    println!("root moves: {}", root.num_unique_moves_in_book());
    print_candidates(&book, args.top);
    Ok(())
}

fn run_next(args: NextArgs) -> Result<()> {
    let book = load_book(&args.book)?;
    print_candidates(&book, args.count);
    Ok(())
}

fn run_set_params(args: SetParamsArgs) -> Result<()> {
    let mut book = load_book(&args.book)?;
    apply_config(&mut book, read_config(&args.config)?)?;
    let out = args.out.as_ref().unwrap_or(&args.book.book);
    book.save_to_file(out)
        .with_context(|| format!("failed to save {}", out.display()))?;
    Ok(())
}

fn run_export_html(args: ExportHtmlArgs) -> Result<()> {
    let book = load_book(&args.book)?;
    let options = HtmlExportOptions {
        rules_label: &args.rules_label,
        rules_link: &args.rules_link,
        dev_mode: args.dev_mode,
        min_visits: args.min_visits,
    };
    let count = book
        .export_to_html_dir(&args.dir, &options)
        .with_context(|| format!("failed to export to {}", args.dir.display()))?;
    println!("{count}");
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::New(args) => run_new(args),
        Commands::Info(args) => run_info(args),
        Commands::Next(args) => run_next(args),
        Commands::SetParams(args) => run_set_params(args),
        Commands::ExportHtml(args) => run_export_html(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_params_overlays_given_keys() {
        let base = BookParams {
            sharp_score_outlier_cap: 4.0,
            ..BookParams::default()
        };
        let given: toml::Table = toml::from_str("costPerMove = 2.5\nbonusForWLPV1 = 0.0\n").unwrap();
        let merged = merge_params(&base, given).unwrap();
        assert_eq!(merged.cost_per_move, 2.5);
        assert_eq!(merged.bonus_for_wlpv1, 0.0);
        assert_eq!(merged.cost_per_log_policy, base.cost_per_log_policy);
        assert_eq!(merged.sharp_score_outlier_cap, 4.0);

        let unknown: toml::Table = toml::from_str("costPerNothing = 1.0\n").unwrap();
        assert!(merge_params(&base, unknown).is_err());
    }

    #[test]
    fn test_set_params_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let book_path = dir.path().join("book.jsonl.gz");
        run_new(NewArgs {
            out: book_path.clone(),
            width: 5,
            height: 5,
            scoring: ScoringArg::Territory,
            komi: 6.5,
            first_player: PlayerArg::Black,
            rep_bound: 0,
            book_version: LATEST_BOOK_VERSION,
            config: None,
        })
        .unwrap();

        let config_path = dir.path().join("params.toml");
        fs::write(&config_path, "[params]\ncostPerMove = 3.0\n").unwrap();
        let book_args = BookArgs {
            book: book_path.clone(),
            sharp_score_outlier_cap: 2.0,
        };
        run_set_params(SetParamsArgs {
            book: book_args,
            config: config_path,
            out: None,
        })
        .unwrap();

        let book = Book::<PlacementBoard>::load_from_file(&book_path, 2.0).unwrap();
        assert_eq!(book.params().cost_per_move, 3.0);
        assert_eq!(book.initial_rules().scoring_rule, ScoringRule::Territory);
        assert_eq!(book.size(), 1);
    }
}
