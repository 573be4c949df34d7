//! book ファイルの入出力（拡張子 .gz なら gzip）

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

const BUF_CAP: usize = 128 * 1024; // 128 KiB

fn is_gz(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("gz"))
}

pub(crate) fn open_reader(path: &Path) -> io::Result<Box<dyn BufRead>> {
    let f = File::open(path)?;
    if is_gz(path) {
        let dec = flate2::read::GzDecoder::new(f);
        return Ok(Box::new(BufReader::with_capacity(BUF_CAP, dec)));
    }
    Ok(Box::new(BufReader::with_capacity(BUF_CAP, f)))
}

/// 圧縮の終端処理のエラーも返すための Writer
#[must_use = "call .close() to propagate compression/IO errors"]
pub(crate) enum BookWriter {
    Plain(BufWriter<File>),
    Gz(flate2::write::GzEncoder<BufWriter<File>>),
}

impl Write for BookWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            BookWriter::Plain(f) => f.write(buf),
            BookWriter::Gz(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            BookWriter::Plain(f) => f.flush(),
            BookWriter::Gz(e) => e.flush(),
        }
    }
}

impl BookWriter {
    pub(crate) fn close(self) -> io::Result<()> {
        match self {
            BookWriter::Plain(mut f) => f.flush(),
            BookWriter::Gz(e) => e.finish()?.flush(),
        }
    }
}

pub(crate) fn open_writer(path: &Path) -> io::Result<BookWriter> {
    let f = BufWriter::with_capacity(BUF_CAP, File::create(path)?);
    if is_gz(path) {
        let enc = flate2::write::GzEncoder::new(f, flate2::Compression::default());
        return Ok(BookWriter::Gz(enc));
    }
    Ok(BookWriter::Plain(f))
}
