//! Weight stream: a flat sequence of 32-bit floats in layer order.
//!
//! For each learnable layer the stream holds every filter value (filter →
//! depth → row → column) followed by the biases; for each batch-norm layer
//! the per-channel means, the per-channel variances and the scale. Other
//! layers contribute nothing and there is no length prefix.
//!
//! [`StreamSource`] and [`StreamSink`] adapt any `Read`/`Write` using
//! little-endian encoding.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::Result;
use crate::network::Network;

/// Supplies the next value of a weight stream.
pub trait WeightSource {
    fn next_f32(&mut self) -> Result<f32>;
}

/// Receives the next value of a weight stream.
pub trait WeightSink {
    fn put_f32(&mut self, value: f32) -> Result<()>;
}

/// Little-endian reader over any byte source.
pub struct StreamSource<R: Read> {
    reader: R,
}

impl<R: Read> StreamSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read> WeightSource for StreamSource<R> {
    fn next_f32(&mut self) -> Result<f32> {
        Ok(self.reader.read_f32::<LittleEndian>()?)
    }
}

/// Little-endian writer over any byte sink.
pub struct StreamSink<W: Write> {
    writer: W,
}

impl<W: Write> StreamSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn flush(&mut self) -> Result<()> {
        Ok(self.writer.flush()?)
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> WeightSink for StreamSink<W> {
    fn put_f32(&mut self, value: f32) -> Result<()> {
        Ok(self.writer.write_f32::<LittleEndian>(value)?)
    }
}

/// Loads every layer's weights from a file.
///
/// # Errors
///
/// I/O errors, including a file shorter than the network's parameter count.
pub fn load_weights<P: AsRef<Path>>(network: &mut Network, path: P) -> Result<()> {
    let file = File::open(path.as_ref())?;
    let mut source = StreamSource::new(BufReader::new(file));
    network.load_weights(&mut source)?;
    log::info!(
        "Loaded {} weights from {}",
        network.parameter_count(),
        path.as_ref().display()
    );
    Ok(())
}

/// Writes every layer's weights to a file.
pub fn save_weights<P: AsRef<Path>>(network: &Network, path: P) -> Result<()> {
    let file = File::create(path.as_ref())?;
    let mut sink = StreamSink::new(BufWriter::new(file));
    network.save_weights(&mut sink)?;
    sink.flush()?;
    log::info!(
        "Saved {} weights to {}",
        network.parameter_count(),
        path.as_ref().display()
    );
    Ok(())
}
