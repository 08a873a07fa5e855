use std::path::Path;

use tempfile::NamedTempFile;

use super::channel::Channel;
use super::constants::INDEX_COLUMN;
use super::error::ExportError;
use super::frame::JoinedFrame;

/// Write a frame as CSV: a header row of `index` followed by the channel names, then
/// one row per event with the timestamp in the index column and empty cells where a
/// channel had no sample.
///
/// The file is written next to `path` under a temporary name and renamed into place
/// once complete, so readers never see a half written snapshot.
pub fn write_frame_csv(frame: &JoinedFrame, path: &Path) -> Result<(), ExportError> {
    let directory = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(directory)?;
    {
        let mut writer = csv::Writer::from_writer(temp.as_file_mut());
        let mut header = vec![INDEX_COLUMN.to_string()];
        header.extend(frame.channels().iter().map(|c| c.name().to_string()));
        writer.write_record(&header)?;

        let mut record: Vec<String> = Vec::with_capacity(header.len());
        for row in 0..frame.len() {
            let Some((timestamp, cells)) = frame.row(row) else {
                break;
            };
            record.clear();
            record.push(timestamp.to_string());
            record.extend(
                cells
                    .iter()
                    .map(|cell| cell.map(|v| v.to_string()).unwrap_or_default()),
            );
            writer.write_record(&record)?;
        }
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path)?;
    Ok(())
}

fn parse_number(value: &str, line: u64) -> Result<f64, ExportError> {
    value.trim().parse::<f64>().map_err(|_| ExportError::BadNumber {
        line,
        value: value.to_string(),
    })
}

/// Read a frame written by [`write_frame_csv`] (or any CSV whose first column is the
/// timestamp index and whose other columns are channels).
///
/// Empty cells are read as absent. Rows are sorted by timestamp.
pub fn read_frame_csv(path: &Path) -> Result<JoinedFrame, ExportError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Err(ExportError::MissingIndex(path.to_path_buf()));
    }
    let channels: Vec<Channel> = headers.iter().skip(1).map(Channel::new).collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let mut fields = record.iter();
        let Some(index) = fields.next() else {
            continue;
        };
        let timestamp = parse_number(index, line)?;
        let cells = fields
            .map(|field| {
                if field.trim().is_empty() {
                    Ok(None)
                } else {
                    parse_number(field, line).map(Some)
                }
            })
            .collect::<Result<Vec<Option<f64>>, ExportError>>()?;
        rows.push((timestamp, cells));
    }

    Ok(JoinedFrame::from_rows(channels, rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> JoinedFrame {
        JoinedFrame::from_rows(
            vec![Channel::new("ebeam"), Channel::new("ipm2")],
            vec![
                (1541001600.25, vec![Some(3405.5), Some(0.125)]),
                (1541001601.5, vec![None, Some(0.25)]),
                (1541001602.75, vec![Some(3406.0), None]),
            ],
        )
    }

    #[test]
    fn test_write_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        write_frame_csv(&frame(), &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "index,ebeam,ipm2");
        assert_eq!(lines[1], "1541001600.25,3405.5,0.125");
        assert_eq!(lines[2], "1541001601.5,,0.25");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        let original = frame();
        write_frame_csv(&original, &path).unwrap();
        assert_eq!(read_frame_csv(&path).unwrap(), original);
    }

    #[test]
    fn test_overwrite_replaces_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        write_frame_csv(&frame(), &path).unwrap();
        write_frame_csv(&frame().tail(1), &path).unwrap();
        assert_eq!(read_frame_csv(&path).unwrap().len(), 1);
        // No temporary files left behind
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_bad_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "index,ipm2\n1.0,0.5\n2.0,oops\n").unwrap();
        assert!(matches!(
            read_frame_csv(&path),
            Err(ExportError::BadNumber { line: 3, .. })
        ));
    }
}
