use std::fs::File;
use std::io::{BufRead, BufReader, Lines};

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::ColumnRef;
use crate::error::RetrievalError;
use crate::recipe::ListFormat;
use crate::store::Store;

/// Row iterator over a separated text list.
///
/// `rows_to_skip` lines are discarded first, then the header (if any) is
/// read. Blank lines and lines starting with the comment symbol are ignored
/// and do not count toward `max_rows_number`.
pub struct ListReader {
    path: Utf8PathBuf,
    separator: char,
    comment_symbol: Option<String>,
    max_rows_number: Option<usize>,
    header: Option<Vec<String>>,
    lines: Lines<BufReader<File>>,
    line_number: usize,
    rows_read: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// 1-based line number in the file.
    pub line: usize,
    pub fields: Vec<String>,
}

impl RawRow {
    pub fn field(&self, index: usize, path: &Utf8Path) -> Result<&str, RetrievalError> {
        self.fields
            .get(index)
            .map(|field| field.trim())
            .ok_or_else(|| RetrievalError::ColumnOutOfRange {
                path: path.to_string(),
                line: self.line,
                column: index,
                width: self.fields.len(),
            })
    }

    /// The trimmed field, or `None` when the column is missing or empty.
    pub fn optional_field(&self, index: usize) -> Option<&str> {
        self.fields
            .get(index)
            .map(|field| field.trim())
            .filter(|field| !field.is_empty())
    }
}

impl ListReader {
    pub fn open(path: &Utf8Path, format: &ListFormat) -> Result<Self, RetrievalError> {
        let file = Store::open(path)?;
        let mut reader = Self {
            path: path.to_path_buf(),
            separator: format.separator,
            comment_symbol: format.comment_symbol.clone(),
            max_rows_number: format.max_rows_number,
            header: None,
            lines: BufReader::new(file).lines(),
            line_number: 0,
            rows_read: 0,
        };
        for _ in 0..format.rows_to_skip {
            if reader.next_line()?.is_none() {
                break;
            }
        }
        if format.header {
            let header = reader
                .next_data_line()?
                .map(|line| reader.split(&line))
                .unwrap_or_default();
            reader.header = Some(
                header
                    .into_iter()
                    .map(|name| name.trim().to_string())
                    .collect(),
            );
        }
        Ok(reader)
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn header(&self) -> Option<&[String]> {
        self.header.as_deref()
    }

    pub fn column_index(&self, column: &ColumnRef) -> Result<usize, RetrievalError> {
        match column {
            ColumnRef::Number(number) => Ok(*number),
            ColumnRef::Name(name) => self
                .header
                .as_ref()
                .and_then(|header| header.iter().position(|field| field == name))
                .ok_or_else(|| RetrievalError::MissingColumn {
                    path: self.path.to_string(),
                    column: name.clone(),
                }),
        }
    }

    fn split(&self, line: &str) -> Vec<String> {
        line.split(self.separator).map(str::to_string).collect()
    }

    fn next_line(&mut self) -> Result<Option<String>, RetrievalError> {
        match self.lines.next() {
            Some(Ok(mut line)) => {
                self.line_number += 1;
                if line.ends_with('\r') {
                    line.pop();
                }
                Ok(Some(line))
            }
            Some(Err(err)) => Err(RetrievalError::malformed(
                &self.path,
                self.line_number + 1,
                format!("unreadable line: {err}"),
            )),
            None => Ok(None),
        }
    }

    fn next_data_line(&mut self) -> Result<Option<String>, RetrievalError> {
        while let Some(line) = self.next_line()? {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(symbol) = &self.comment_symbol {
                if line.starts_with(symbol.as_str()) {
                    continue;
                }
            }
            return Ok(Some(line));
        }
        Ok(None)
    }
}

impl Iterator for ListReader {
    type Item = Result<RawRow, RetrievalError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self
            .max_rows_number
            .is_some_and(|max_rows| self.rows_read >= max_rows)
        {
            return None;
        }
        match self.next_data_line() {
            Ok(Some(line)) => {
                self.rows_read += 1;
                Some(Ok(RawRow {
                    line: self.line_number,
                    fields: self.split(&line),
                }))
            }
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn write(dir: &tempfile::TempDir, content: &str) -> Utf8PathBuf {
        let path = Utf8PathBuf::from_path_buf(dir.path().join("list.tsv")).unwrap();
        fs::write(path.as_std_path(), content).unwrap();
        path
    }

    #[test]
    fn skips_rows_comments_and_caps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "generated by tool\nsrc,dst\n# comment\na,b\n\nb,c\nc,d\n",
        );
        let format = ListFormat {
            separator: ',',
            header: true,
            comment_symbol: Some("#".to_string()),
            rows_to_skip: 1,
            max_rows_number: Some(2),
            is_correct: false,
            remove_chevrons: false,
            remove_spaces: false,
        };
        let reader = ListReader::open(&path, &format).unwrap();
        assert_eq!(
            reader.header().unwrap(),
            &["src".to_string(), "dst".to_string()]
        );
        assert_eq!(
            reader
                .column_index(&ColumnRef::Name("dst".to_string()))
                .unwrap(),
            1
        );
        let rows = reader.collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].line, 4);
        assert_eq!(rows[1].fields, vec!["b".to_string(), "c".to_string()]);
    }
}
