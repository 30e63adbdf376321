
use std::io::Read;
use std::path::PathBuf;
use std::str::FromStr;

use encoding_rs::SHIFT_JIS;

use crate::error::{IngestError, IngestErrorDescription};

const BOM: &[u8] = b"\xEF\xBB\xBF";

/// Where speech text is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextSource {
    Stdin,
    File(PathBuf),
}

impl TextSource {
    pub fn is_stdin(&self) -> bool {
        matches!(self, Self::Stdin)
    }

    /// Dump tag for artifacts produced from this source.
    pub fn name(&self) -> String {
        match self {
            Self::Stdin => "stdin".to_string(),
            Self::File(path) => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "file".to_string()),
        }
    }

    pub fn read_bytes(&self) -> Result<Vec<u8>, IngestError> {
        match self {
            Self::Stdin => {
                let mut buf = Vec::new();
                std::io::stdin().lock().read_to_end(&mut buf)?;
                Ok(buf)
            },
            Self::File(path) => Ok(std::fs::read(path)?),
        }
    }

    pub fn read_texts(&self) -> Result<Vec<String>, IngestError> {
        let bytes = self.read_bytes()?;
        decode_lines(&split_lines(&bytes), self.is_stdin())
    }
}

/// Splits after every `\n`, keeping the terminator like a line reader would.
pub fn split_lines(bytes: &[u8]) -> Vec<&[u8]> {
    bytes.split_inclusive(|b| *b == b'\n').collect()
}

/// A line the attempted reading does not accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Undecodable;

/// Reads a line the way a UTF-8 producer wrote it.
fn reinterpret(line: &[u8]) -> Result<String, Undecodable> {
    std::str::from_utf8(line).map(str::to_owned).map_err(|_| Undecodable)
}

/// Reads a line the way the legacy Japanese locale (Shift_JIS / CP932) sees it.
fn legacy(line: &[u8]) -> Result<String, Undecodable> {
    let (text, had_errors) = SHIFT_JIS.decode_without_bom_handling(line);
    if had_errors {
        Err(Undecodable)
    } else {
        Ok(text.into_owned())
    }
}

/// Decodes every line with one encoding chosen for the whole input, then strips
/// trailing whitespace.
///
/// A UTF-8 BOM on the first line selects UTF-8. Otherwise the lines are taken
/// as UTF-8 unless one of them is not, in which case all of them are read as
/// legacy Shift_JIS. Input that neither reading accepts is unreadable.
pub fn decode_lines<L: AsRef<[u8]>>(lines: &[L], from_stdin: bool) -> Result<Vec<String>, IngestError> {
    let first = lines
        .first()
        .ok_or(IngestError::new(IngestErrorDescription::NoInput))?;

    let unreadable = || IngestError::new(IngestErrorDescription::Unreadable { from_stdin });

    let texts = if first.as_ref().starts_with(BOM) {
        lines
            .iter()
            .map(|line| {
                let line = line.as_ref();
                reinterpret(line.strip_prefix(BOM).unwrap_or(line))
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| unreadable())?
    } else {
        match lines.iter().map(|line| reinterpret(line.as_ref())).collect::<Result<Vec<_>, _>>() {
            Ok(texts) => texts,
            Err(Undecodable) => {
                log::debug!("Input is not UTF-8, reading it as Shift_JIS");
                lines
                    .iter()
                    .map(|line| legacy(line.as_ref()))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|_| unreadable())?
            },
        }
    };

    Ok(texts.into_iter().map(|t| t.trim_end().to_string()).collect())
}

/// One item of a line selection, 1-based and inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSpec {
    Index(usize),
    Range {
        start: Option<usize>,
        end: Option<usize>,
    },
}

/// Comma separated line numbers and ranges, e.g. `2,4-5` or `:3,7:`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineSelector(Vec<LineSpec>);

impl LineSelector {
    pub fn specs(&self) -> &[LineSpec] {
        &self.0
    }

    /// Picks lines in selector order. Any number past the end of `lines` is an error.
    ///
    /// A selector left empty by ignored ranges selects nothing in particular, so every line is kept.
    pub fn select(&self, lines: &[String]) -> Result<Vec<String>, IngestError> {
        if self.0.is_empty() {
            return Ok(lines.to_vec());
        }

        let invalid = || IngestError::new(IngestErrorDescription::InvalidLineNumber);
        let count = lines.len();
        let mut selected = Vec::new();

        for spec in &self.0 {
            match *spec {
                LineSpec::Index(n) => {
                    if n == 0 || n > count {
                        return Err(invalid());
                    }
                    selected.push(lines[n - 1].clone());
                },
                LineSpec::Range { start, end } => {
                    if start.is_some_and(|s| s == 0 || s > count) || end.is_some_and(|e| e > count) {
                        return Err(invalid());
                    }
                    let start = start.unwrap_or(1);
                    let end = end.unwrap_or(count);
                    if start <= end {
                        selected.extend_from_slice(&lines[start - 1..end]);
                    }
                },
            }
        }

        Ok(selected)
    }
}

impl FromStr for LineSelector {
    type Err = String;

    fn from_str(arg: &str) -> Result<Self, Self::Err> {
        let number = |s: &str| -> Result<Option<usize>, String> {
            let s = s.trim();
            if s.is_empty() {
                Ok(None)
            } else {
                s.parse().map(Some).map_err(|_| format!("invalid line number: {}", s))
            }
        };

        let mut specs = Vec::new();
        for item in arg.split(',') {
            match item.split_once(|c: char| c == '-' || c == ':') {
                Some((start, end)) => {
                    let (start, end) = (number(start)?, number(end)?);
                    if let (Some(s), Some(e)) = (start, end) {
                        if s > e {
                            log::warn!("Range {} should have start <= end, ignored", item.trim());
                            continue;
                        }
                    }
                    specs.push(LineSpec::Range { start, end });
                },
                None => match number(item)? {
                    Some(n) => specs.push(LineSpec::Index(n)),
                    None => return Err(format!("empty item in line numbers: {:?}", arg)),
                },
            }
        }

        Ok(Self(specs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("line {}", i)).collect()
    }

    #[test]
    fn bom_input_is_stripped() {
        let input = "\u{feff}おはよう\r\nこんにちは\n".as_bytes();
        let texts = decode_lines(&split_lines(input), false).unwrap();
        assert_eq!(texts, vec!["おはよう", "こんにちは"]);
    }

    #[test]
    fn utf8_input_is_read_as_utf8() {
        let input = "吾輩は猫である。  \n名前はまだ無い。\n".as_bytes();
        let texts = decode_lines(&split_lines(input), true).unwrap();
        assert_eq!(texts, vec!["吾輩は猫である。", "名前はまだ無い。"]);
    }

    #[test]
    fn shift_jis_input_falls_back_to_legacy_reading() {
        let (encoded, _, _) = SHIFT_JIS.encode("ずんだもん\nです\n");
        let texts = decode_lines(&split_lines(&encoded), false).unwrap();
        assert_eq!(texts, vec!["ずんだもん", "です"]);
    }

    #[test]
    fn both_readings_agree_on_shared_input() {
        let input = b"Hello, VOICEVOX!\t\nline two  \n";
        for line in split_lines(input) {
            assert_eq!(reinterpret(line).unwrap(), legacy(line).unwrap());
        }
        let direct = split_lines(input)
            .into_iter()
            .map(|l| std::str::from_utf8(l).unwrap().trim_end().to_string())
            .collect::<Vec<_>>();
        assert_eq!(decode_lines(&split_lines(input), false).unwrap(), direct);
    }

    #[test]
    fn undecodable_input_names_its_source() {
        let input: &[u8] = b"\xff\xfe\xfd\n";
        let err = decode_lines(&split_lines(input), true).unwrap_err();
        assert!(matches!(err.as_inner(), IngestErrorDescription::Unreadable { from_stdin: true }));
        assert_eq!(err.code(), Some(1));

        let err = decode_lines(&split_lines(input), false).unwrap_err();
        assert!(err.to_string().contains("file"));
    }

    #[test]
    fn empty_input_is_an_error() {
        let err = decode_lines(&split_lines(b""), false).unwrap_err();
        assert!(matches!(err.as_inner(), IngestErrorDescription::NoInput));
    }

    #[test]
    fn selector_picks_indices_and_ranges_in_order() {
        let selector: LineSelector = "2,4-5".parse().unwrap();
        assert_eq!(selector.select(&lines(5)).unwrap(), vec!["line 2", "line 4", "line 5"]);

        let selector: LineSelector = "5,:2,4:".parse().unwrap();
        assert_eq!(
            selector.select(&lines(5)).unwrap(),
            vec!["line 5", "line 1", "line 2", "line 4", "line 5"],
        );
    }

    #[test]
    fn selector_out_of_range_fails_with_exit_one() {
        let selector: LineSelector = "10".parse().unwrap();
        let err = selector.select(&lines(5)).unwrap_err();
        assert_eq!(err.code(), Some(1));
        assert!(err.to_string().contains("-n/--line-numbers"));

        for arg in ["0", "3-9", "6-"] {
            let selector: LineSelector = arg.parse().unwrap();
            assert!(selector.select(&lines(5)).is_err(), "{}", arg);
        }
    }

    #[test]
    fn reversed_range_is_ignored() {
        let selector: LineSelector = "4-2,1".parse().unwrap();
        assert_eq!(selector.specs(), &[LineSpec::Index(1)]);
    }

    #[test]
    fn only_reversed_ranges_keep_every_line() {
        let selector: LineSelector = "4-2".parse().unwrap();
        assert!(selector.specs().is_empty());
        assert_eq!(selector.select(&lines(5)).unwrap(), lines(5));
    }

    #[test]
    fn malformed_selector_is_rejected() {
        assert!("a".parse::<LineSelector>().is_err());
        assert!("1,,2".parse::<LineSelector>().is_err());
        assert!("x-2".parse::<LineSelector>().is_err());
    }

    #[test]
    fn source_name_is_file_stem() {
        assert_eq!(TextSource::File(PathBuf::from("texts/chapter1.txt")).name(), "chapter1");
        assert_eq!(TextSource::Stdin.name(), "stdin");
    }
}
