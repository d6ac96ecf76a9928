// Render-side entity handles

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::telegram::EntityState;

/// Handle for one remote entity on the render side. The engine only ever
/// pushes interpolated state through it; releasing the entity is the
/// handle's Drop.
pub trait EntityProxy: Send + Sync {
    /// Apply one sampled state. Elevation is in feet here; everything
    /// upstream of the render boundary is metric.
    fn apply_state(&mut self, state: &EntityState) -> io::Result<()>;
}

/// Factory for entity proxies, implemented by whatever hosts the render
/// side.
pub trait LifecycleBridge: Send + Sync {
    fn on_entity_discovered(&mut self, entity_id: &str) -> Box<dyn EntityProxy>;
}

/// Bridge for headless runs: each applied state goes to the debug log.
pub struct LogBridge;

struct LogProxy {
    entity_id: String,
}

impl LifecycleBridge for LogBridge {
    fn on_entity_discovered(&mut self, entity_id: &str) -> Box<dyn EntityProxy> {
        debug!("Discovered entity {}", entity_id);
        Box::new(LogProxy {
            entity_id: entity_id.to_string(),
        })
    }
}

impl EntityProxy for LogProxy {
    fn apply_state(&mut self, state: &EntityState) -> io::Result<()> {
        debug!(
            "{}: lat {:.6} lon {:.6} el {:.0} ft hdg {:.1}",
            self.entity_id, state.lat, state.lon, state.el, state.heading
        );
        Ok(())
    }
}

impl Drop for LogProxy {
    fn drop(&mut self) {
        debug!("Released entity {}", self.entity_id);
    }
}

/// Bridge that records every applied state to a CSV file. All proxies
/// share one writer.
pub struct CsvBridge {
    writer: Arc<Mutex<BufWriter<File>>>,
}

impl CsvBridge {
    /// Open the file in append mode, writing the header only when the
    /// file starts out empty.
    pub fn new(path: &str) -> io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        let fresh = file.metadata()?.len() == 0;
        let mut writer = BufWriter::new(file);
        if fresh {
            writeln!(
                writer,
                "sample_time_ms,entity_id,lat,lon,elevation_ft,pitch,roll,heading"
            )?;
            writer.flush()?;
        }
        Ok(CsvBridge {
            writer: Arc::new(Mutex::new(writer)),
        })
    }
}

impl LifecycleBridge for CsvBridge {
    fn on_entity_discovered(&mut self, entity_id: &str) -> Box<dyn EntityProxy> {
        Box::new(CsvProxy {
            entity_id: entity_id.to_string(),
            writer: self.writer.clone(),
        })
    }
}

struct CsvProxy {
    entity_id: String,
    writer: Arc<Mutex<BufWriter<File>>>,
}

impl EntityProxy for CsvProxy {
    fn apply_state(&mut self, state: &EntityState) -> io::Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "CSV writer lock poisoned"))?;
        writeln!(writer, "{}", csv_row(&self.entity_id, state))?;
        writer.flush()
    }
}

/// One CSV row for an applied state. Split out so tests can check the
/// format without touching the filesystem.
fn csv_row(entity_id: &str, state: &EntityState) -> String {
    format!(
        "{},{},{:.6},{:.6},{:.1},{:.2},{:.2},{:.2}",
        state.timestamp,
        entity_id,
        state.lat,
        state.lon,
        state.el,
        state.pitch,
        state.roll,
        state.heading
    )
}
