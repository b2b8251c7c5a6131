use crate::avro::ContainerReader;
use crate::report::EventRecord;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Print every record of a batch file as one JSON object per line
pub fn inspect(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let data = std::fs::read(path)
        .map_err(|e| format!("failed to read '{}': {}", path.display(), e))?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let summary = write_records(&data, &mut out)?;
    out.flush()?;

    eprintln!(
        "{}: codec {}, {} blocks, {} records",
        path.display(),
        summary.codec,
        summary.blocks,
        summary.records
    );
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
pub struct InspectSummary {
    pub codec: &'static str,
    pub blocks: usize,
    pub records: usize,
}

pub fn write_records<W: Write>(
    data: &[u8],
    out: &mut W,
) -> Result<InspectSummary, Box<dyn std::error::Error>> {
    let reader = ContainerReader::new(data)?;
    let codec = reader.codec().name();

    let blocks = reader.blocks()?;
    let mut records = 0;
    for block in &blocks {
        for record in block.decode::<EventRecord>()? {
            serde_json::to_writer(&mut *out, &record)?;
            out.write_all(b"\n")?;
            records += 1;
        }
    }

    Ok(InspectSummary {
        codec,
        blocks: blocks.len(),
        records,
    })
}
