// Wire telegrams: one comma-separated text line per state report

/// One state sample for an entity. Angles are degrees, elevation is
/// meters, the timestamp is epoch milliseconds on the sender's clock.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EntityState {
    pub timestamp: i64,
    pub lat: f64,
    pub lon: f64,
    pub el: f64,
    pub pitch: f64,
    pub roll: f64,
    pub heading: f64,
}

impl EntityState {
    /// All-zero state carrying the given timestamp.
    pub fn zeroed(timestamp: i64) -> Self {
        EntityState {
            timestamp,
            ..Default::default()
        }
    }
}

/// Parse one incoming telegram.
///
/// Format: `timestampMs,entityId,lat,lon,elevationM,pitch,roll,heading`.
/// Fields are trimmed, so senders may pad with spaces after the commas.
pub fn parse(line: &str) -> Result<(String, EntityState), String> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 8 {
        return Err(format!("expected 8 fields, got {}", fields.len()));
    }

    let timestamp: i64 = fields[0]
        .parse()
        .map_err(|_| format!("bad timestamp '{}'", fields[0]))?;
    let entity_id = fields[1];
    if entity_id.is_empty() {
        return Err("empty entity id".to_string());
    }

    let mut values = [0.0f64; 6];
    for (slot, raw) in values.iter_mut().zip(&fields[2..]) {
        *slot = raw
            .parse()
            .map_err(|_| format!("bad number '{}'", raw))?;
    }

    Ok((
        entity_id.to_string(),
        EntityState {
            timestamp,
            lat: values[0],
            lon: values[1],
            el: values[2],
            pitch: values[3],
            roll: values[4],
            heading: values[5],
        },
    ))
}

/// Format an outgoing telegram.
pub fn format(entity_id: &str, state: &EntityState) -> String {
    format!(
        "{},{},{:.6},{:.6},{:.2},{:.2},{:.2},{:.2}",
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
