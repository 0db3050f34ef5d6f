use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use num_complex::Complex64;
use sqt_core::error::{ScatterError, ScatterResult};
use sqt_core::geom::Vec3;

const MAGIC: &[u8; 8] = b"SQSIG001";
const CLIENT_BUFFER: usize = 64;
const CLIENT_FLUSH_INTERVAL: Duration = Duration::from_secs(2);
const CHANNEL_BOUND: usize = 1024;

/// One result per q-vector. `fqt` is present in time-correlation mode only;
/// records may be written out of q order, the vector is stored alongside so
/// readers can re-sort.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    pub q: Vec3,
    pub fq0: Complex64,
    pub fq: Complex64,
    pub fq2: Complex64,
    pub fqt: Option<Vec<Complex64>>,
}

enum WriterTag {
    Write(ResultRecord),
    Hangup,
}

/// Client side of the writer service: buffers records, flushes on size or
/// age, and signals hangup when a partition finishes or aborts.
pub struct WriterClient {
    tx: Sender<WriterTag>,
    buffer: Vec<ResultRecord>,
    last_flush: Instant,
}

impl WriterClient {
    fn new(tx: Sender<WriterTag>) -> Self {
        Self {
            tx,
            buffer: Vec::new(),
            last_flush: Instant::now(),
        }
    }

    pub fn write(&mut self, record: ResultRecord) -> ScatterResult<()> {
        self.buffer.push(record);
        if self.buffer.len() >= CLIENT_BUFFER || self.last_flush.elapsed() > CLIENT_FLUSH_INTERVAL
        {
            self.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> ScatterResult<()> {
        for record in self.buffer.drain(..) {
            self.tx
                .send(WriterTag::Write(record))
                .map_err(|_| ScatterError::Io(writer_gone()))?;
        }
        self.last_flush = Instant::now();
        Ok(())
    }

    pub fn hangup(&mut self) -> ScatterResult<()> {
        self.flush()?;
        self.tx
            .send(WriterTag::Hangup)
            .map_err(|_| ScatterError::Io(writer_gone()))?;
        Ok(())
    }
}

impl Clone for WriterClient {
    fn clone(&self) -> Self {
        Self::new(self.tx.clone())
    }
}

fn writer_gone() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::BrokenPipe, "signal writer hung up")
}

/// Service side: drains the channel on its own thread and appends records
/// to the signal file. One hangup per client; the service exits once every
/// client has hung up.
pub struct SignalWriter {
    handle: Option<JoinHandle<ScatterResult<usize>>>,
    tx: Sender<WriterTag>,
}

impl SignalWriter {
    pub fn create(path: impl Into<PathBuf>, n_frames: usize, clients: usize) -> ScatterResult<Self> {
        let path = path.into();
        let mut file = BufWriter::new(File::create(&path)?);
        file.write_all(MAGIC)?;
        file.write_all(&(n_frames as u64).to_le_bytes())?;
        let (tx, rx) = bounded::<WriterTag>(CHANNEL_BOUND);
        let clients = clients.max(1);
        let handle = std::thread::spawn(move || service_loop(file, rx, n_frames, clients));
        Ok(Self {
            handle: Some(handle),
            tx,
        })
    }

    pub fn client(&self) -> WriterClient {
        WriterClient::new(self.tx.clone())
    }

    /// Wait for all clients to hang up; returns the record count.
    pub fn join(mut self) -> ScatterResult<usize> {
        let handle = match self.handle.take() {
            Some(h) => h,
            None => return Ok(0),
        };
        // release the service's own sender so the channel can close even
        // if a client vanished without a hangup
        drop(self);
        handle
            .join()
            .map_err(|_| ScatterError::Fatal("signal writer thread panicked".into()))?
    }
}

fn service_loop(
    mut file: BufWriter<File>,
    rx: Receiver<WriterTag>,
    n_frames: usize,
    clients: usize,
) -> ScatterResult<usize> {
    let mut hangups = 0;
    let mut records = 0;
    while let Ok(tag) = rx.recv() {
        match tag {
            WriterTag::Write(record) => {
                write_record(&mut file, &record, n_frames)?;
                records += 1;
            }
            WriterTag::Hangup => {
                hangups += 1;
                if hangups >= clients {
                    break;
                }
            }
        }
    }
    file.flush()?;
    Ok(records)
}

fn write_record(
    file: &mut impl Write,
    record: &ResultRecord,
    n_frames: usize,
) -> ScatterResult<()> {
    for v in record.q.to_array() {
        file.write_all(&v.to_le_bytes())?;
    }
    for v in [record.fq0, record.fq, record.fq2] {
        file.write_all(&v.re.to_le_bytes())?;
        file.write_all(&v.im.to_le_bytes())?;
    }
    match &record.fqt {
        Some(fqt) => {
            if fqt.len() != n_frames {
                return Err(ScatterError::Fatal(format!(
                    "fqt record has {} entries, expected {}",
                    fqt.len(),
                    n_frames
                )));
            }
            file.write_all(&[1u8])?;
            for v in fqt {
                file.write_all(&v.re.to_le_bytes())?;
                file.write_all(&v.im.to_le_bytes())?;
            }
        }
        None => file.write_all(&[0u8])?,
    }
    Ok(())
}

/// Read a signal file back; doubles come out bit-identical to what the
/// records carried in.
pub struct SignalReader {
    pub n_frames: usize,
    pub records: Vec<ResultRecord>,
}

impl SignalReader {
    pub fn open(path: impl AsRef<Path>) -> ScatterResult<Self> {
        let mut file = BufReader::new(File::open(path)?);
        let mut magic = [0u8; 8];
        file.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(ScatterError::Fatal("not a signal file".into()));
        }
        let n_frames = read_u64(&mut file)? as usize;
        let mut records = Vec::new();
        loop {
            let mut probe = [0u8; 8];
            match file.read_exact(&mut probe) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let qx = f64::from_le_bytes(probe);
            let qy = read_f64(&mut file)?;
            let qz = read_f64(&mut file)?;
            let fq0 = read_complex(&mut file)?;
            let fq = read_complex(&mut file)?;
            let fq2 = read_complex(&mut file)?;
            let mut flag = [0u8; 1];
            file.read_exact(&mut flag)?;
            let fqt = if flag[0] == 1 {
                let mut fqt = Vec::with_capacity(n_frames);
                for _ in 0..n_frames {
                    fqt.push(read_complex(&mut file)?);
                }
                Some(fqt)
            } else {
                None
            };
            records.push(ResultRecord {
                q: Vec3::new(qx, qy, qz),
                fq0,
                fq,
                fq2,
                fqt,
            });
        }
        Ok(Self { n_frames, records })
    }
}

fn read_u64(file: &mut impl Read) -> ScatterResult<u64> {
    let mut buf = [0u8; 8];
    file.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_f64(file: &mut impl Read) -> ScatterResult<f64> {
    let mut buf = [0u8; 8];
    file.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

fn read_complex(file: &mut impl Read) -> ScatterResult<Complex64> {
    let re = read_f64(file)?;
    let im = read_f64(file)?;
    Ok(Complex64::new(re, im))
}

/// Orientational average of the records of one |q| shell: member-wise mean
/// of fq0/fq/fq2/fqt; the representative q is the first member's.
pub fn average_records(records: &[&ResultRecord]) -> Option<ResultRecord> {
    let first = records.first()?;
    let n = records.len() as f64;
    let mut out = ResultRecord {
        q: first.q,
        fq0: Complex64::new(0.0, 0.0),
        fq: Complex64::new(0.0, 0.0),
        fq2: Complex64::new(0.0, 0.0),
        fqt: first
            .fqt
            .as_ref()
            .map(|fqt| vec![Complex64::new(0.0, 0.0); fqt.len()]),
    };
    for record in records {
        out.fq0 += record.fq0 / n;
        out.fq += record.fq / n;
        out.fq2 += record.fq2 / n;
        if let (Some(acc), Some(fqt)) = (out.fqt.as_mut(), record.fqt.as_ref()) {
            for (slot, v) in acc.iter_mut().zip(fqt.iter()) {
                *slot += *v / n;
            }
        }
    }
    Some(out)
}
