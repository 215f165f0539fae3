//! Plain-text stimulus and reference recording.
//!
//! One hex line per clock, most significant 32-bit chunk first (the least
//! significant chunk comes last on the line). A Verilog testbench reads
//! the same files with `$fscanf`.

use ferro_ir::{Design, Node, Value};
use std::fs;
use std::io;
use std::path::Path;

/// Recorder file errors.
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    /// The file could not be read or written.
    #[error("recorder I/O error: {0}")]
    Io(#[from] io::Error),

    /// A line did not parse as hex chunks.
    #[error("recorder parse error on line {line}")]
    Parse {
        /// 1-based line number.
        line: usize,
    },
}

/// Number of 32-bit chunks a value of the node's width occupies.
fn chunk_count(node: &Node) -> usize {
    let bits = node.ty().bit_width().unwrap_or(1);
    bits.div_ceil(32) as usize
}

fn value_chunks(value: &Value, count: usize) -> Vec<u32> {
    let mut chunks = vec![0u32; count];
    match value {
        Value::Bool(b) => chunks[0] = u32::from(*b),
        Value::Int32(v) => chunks[0] = *v as u32,
        Value::Int64(v) => {
            chunks[0] = (*v & 0xffff_ffff) as u32;
            if count > 1 {
                chunks[1] = ((*v >> 32) & 0xffff_ffff) as u32;
            }
        }
        Value::Double(_) => {}
        Value::Fixed(v) => {
            for (i, chunk) in chunks.iter_mut().enumerate() {
                *chunk = v.limbs()[i];
            }
        }
    }
    chunks
}

/// Records one node's value per clock into a hex text file.
#[derive(Debug)]
pub struct Recorder {
    node: Node,
    chunks: usize,
    lines: Vec<String>,
}

impl Recorder {
    /// Creates a recorder for the given node.
    pub fn new(node: Node) -> Self {
        Self {
            node,
            chunks: chunk_count(&node),
            lines: Vec::new(),
        }
    }

    /// Captures the node's current value as one line; call once per
    /// simulated step.
    pub fn capture(&mut self, design: &Design) {
        let chunks = value_chunks(design.read(self.node), self.chunks);
        let line = chunks
            .iter()
            .rev() // most significant chunk first
            .map(|chunk| format!("{chunk:08x}"))
            .collect::<Vec<_>>()
            .join(" ");
        self.lines.push(line);
    }

    /// The number of captured clocks.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Returns `true` if nothing has been captured.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Writes all captured lines to a sink.
    pub fn write(&self, sink: &mut dyn io::Write) -> io::Result<()> {
        for line in &self.lines {
            writeln!(sink, "{line}")?;
        }
        Ok(())
    }

    /// Writes all captured lines to a file.
    pub fn save(&self, path: &Path) -> Result<(), RecorderError> {
        let mut text = self.lines.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        fs::write(path, text)?;
        Ok(())
    }

    /// Loads a recorded file back as per-clock chunk vectors, least
    /// significant chunk first.
    pub fn load(path: &Path) -> Result<Vec<Vec<u32>>, RecorderError> {
        let text = fs::read_to_string(path)?;
        let mut result = Vec::new();
        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let mut chunks = Vec::new();
            for word in line.split_whitespace() {
                let chunk = u32::from_str_radix(word, 16)
                    .map_err(|_| RecorderError::Parse { line: index + 1 })?;
                chunks.push(chunk);
            }
            chunks.reverse();
            result.push(chunks);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferro_fixed::{DynFix, SignalType};
    use ferro_sim::Simulator;

    #[test]
    fn chunk_counts() {
        let mut design = Design::new();
        let narrow = design.constant_f64(SignalType::ufix(8, 0), 1.0).unwrap();
        let wide = design.constant_f64(SignalType::sfix(48, 16), 1.0).unwrap();
        assert_eq!(chunk_count(&narrow), 1);
        assert_eq!(chunk_count(&wide), 2);
    }

    #[test]
    fn records_one_line_per_clock() {
        let mut design = Design::new();
        let enable = design.constant(Value::Bool(true));
        let source = design.source(SignalType::ufix(8, 0), 1, enable).unwrap();
        design
            .set_source_data(
                source.block,
                vec![
                    Value::Fixed(DynFix::from_i64_with(false, 8, 0, 0xab).unwrap()),
                    Value::Fixed(DynFix::from_i64_with(false, 8, 0, 0x05).unwrap()),
                ],
                false,
            )
            .unwrap();

        let mut recorder = Recorder::new(source.data[0]);
        let mut sim = Simulator::new(&mut design).unwrap();
        for _ in 0..2 {
            sim.run(&mut design, 1).unwrap();
            recorder.capture(&design);
        }

        let mut out = Vec::new();
        recorder.write(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "000000ab\n00000005\n");
    }

    #[test]
    fn wide_values_have_high_chunk_first() {
        let mut design = Design::new();
        let value = DynFix::from_f64_with(true, 48, 16, -3.14159).unwrap();
        let node = design.constant(Value::Fixed(value));
        let mut recorder = Recorder::new(node);
        let mut sim = Simulator::new(&mut design).unwrap();
        sim.run(&mut design, 1).unwrap();
        recorder.capture(&design);

        let mut out = Vec::new();
        recorder.write(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let words: Vec<&str> = text.trim().split(' ').collect();
        assert_eq!(words.len(), 2);
        assert_eq!(
            u32::from_str_radix(words[1], 16).unwrap(),
            value.limbs()[0],
            "least significant chunk is last"
        );
    }

    #[test]
    fn save_load_roundtrip() {
        let mut design = Design::new();
        let node = design
            .constant_f64(SignalType::ufix(40, 0), 123456789.0)
            .unwrap();
        let mut recorder = Recorder::new(node);
        let mut sim = Simulator::new(&mut design).unwrap();
        sim.run(&mut design, 1).unwrap();
        recorder.capture(&design);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stimulus.txt");
        recorder.save(&path).unwrap();

        let loaded = Recorder::load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0][0], 123456789u64 as u32);
    }

    #[test]
    fn load_rejects_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.txt");
        std::fs::write(&path, "zzzz\n").unwrap();
        assert!(matches!(
            Recorder::load(&path),
            Err(RecorderError::Parse { line: 1 })
        ));
    }
}
