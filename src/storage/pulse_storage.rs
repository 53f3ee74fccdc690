use std::{
    future::Future,
    io::ErrorKind,
    ops::Deref,
    path::{Path, PathBuf},
};

use anyhow::Result;
use chrono::NaiveDate;
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, AsyncSeek, AsyncSeekExt, AsyncWrite, AsyncWriteExt, BufReader},
};
use tracing::{debug, warn};

use crate::{collector::event::ActivityEvent, utils::time::date_to_record_name};

/// Interface for abstracting storage of live activity pulses.
pub trait PulseStorage {
    type RecordFile: PulseFileHandle;

    /// Opens or creates a record file for a UTC day. Pulses of one day always land in the same
    /// file.
    fn create_or_append_record(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Self::RecordFile>>;

    /// Retrieves the pulses recorded for a day. A day nobody recorded reads as empty, but an
    /// unreadable file is an error.
    fn get_data_for(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Vec<ActivityEvent>>> + Send;
}

impl<T: Deref> PulseStorage for T
where
    T::Target: PulseStorage,
{
    type RecordFile = <T::Target as PulseStorage>::RecordFile;

    fn create_or_append_record(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Self::RecordFile>> {
        self.deref().create_or_append_record(date)
    }

    fn get_data_for(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Vec<ActivityEvent>>> + Send {
        self.deref().get_data_for(date)
    }
}

pub trait PulseFileHandle {
    fn append(&mut self, pulses: Vec<ActivityEvent>) -> impl Future<Output = Result<()>>;
    fn get_date(&self) -> NaiveDate;
}

/// The main realization of [PulseStorage].
pub struct PulseStorageImpl {
    record_dir: PathBuf,
}

impl PulseStorageImpl {
    pub fn new(record_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&record_dir)?;

        Ok(Self { record_dir })
    }

    async fn get_all_inner(&self, path: &Path) -> Result<Vec<ActivityEvent>> {
        async fn extract(path: &Path) -> std::result::Result<Vec<ActivityEvent>, std::io::Error> {
            debug!("Extracting {path:?}");
            let file = File::open(path).await?;
            file.lock_shared()?;
            let buffer = BufReader::new(file);
            let mut lines = buffer.lines();
            let mut pulses = vec![];
            while let Some(v) = lines.next_line().await? {
                if v.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<ActivityEvent>(&v) {
                    Ok(v) => pulses.push(v),
                    Err(e) => {
                        // A write cut short by a shutdown leaves half a line behind.
                        warn!(
                            "During parsing in path {:?} found illegal json string {}:  {e}",
                            path, &v
                        )
                    }
                }
            }

            lines.into_inner().into_inner().unlock_async().await?;

            Ok(pulses)
        }

        match extract(path).await {
            Ok(s) => Ok(s),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(vec![]),
            Err(e) => Err(e)?,
        }
    }
}

impl PulseStorage for PulseStorageImpl {
    type RecordFile = PulseRecordFile<File>;

    async fn create_or_append_record(&self, date: NaiveDate) -> Result<Self::RecordFile> {
        let path = self.record_dir.join(date_to_record_name(date));

        let file = File::options()
            .create(true)
            .append(true)
            .open(path)
            .await?;

        Ok(PulseRecordFile::new(file, date))
    }

    async fn get_data_for(&self, date: NaiveDate) -> Result<Vec<ActivityEvent>> {
        let path = self.record_dir.join(date_to_record_name(date));
        self.get_all_inner(&path).await
    }
}

pub struct PulseRecordFile<F> {
    file: F,
    date: NaiveDate,
}

impl<F: AsyncWrite + AsyncSeek + AsyncFileExt + Unpin> PulseFileHandle for PulseRecordFile<F> {
    async fn append(&mut self, pulses: Vec<ActivityEvent>) -> Result<()> {
        if pulses.is_empty() {
            return Ok(());
        }
        // Semi-safe acquire-release for a file
        self.file.lock_exclusive()?;
        let result = Self::append_with_file(&mut self.file, pulses).await;
        self.file.unlock_async().await?;
        result
    }

    fn get_date(&self) -> NaiveDate {
        self.date
    }
}

impl<F: AsyncWrite + AsyncSeek + AsyncFileExt + Unpin> PulseRecordFile<F> {
    fn new(file: F, date: NaiveDate) -> Self {
        Self { file, date }
    }

    async fn append_with_file(file: &mut F, pulses: Vec<ActivityEvent>) -> Result<()> {
        let mut buffer = Vec::<u8>::new();
        for pulse in pulses {
            serde_json::to_writer(&mut buffer, &pulse)?;
            buffer.push(b'\n');
        }

        file.seek(std::io::SeekFrom::End(0)).await?;
        file.write_all(&buffer).await?;
        file.flush().await?;
        Ok(())
    }
}
