pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# DRAIN CONFIGURATION
# =============================================================================
# Drain accepts telemetry beacons over HTTP and writes every event to each of
# the configured destinations. File destinations roll events into sealed
# batch files which a daily compaction pass merges into one file per day.
#
# Config file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/drain/config.yml
#   3. /etc/drain/config.yml
#
# Any value may reference an environment variable as $env{NAME}.

# =============================================================================
# INGEST
# =============================================================================

ingest:
  # Address of the HTTP endpoint (POST /event, GET /health)
  listen: 0.0.0.0:4000
  # Events queued between the HTTP handlers and the destinations. When full,
  # requests wait until the destinations catch up.
  buffer_limit: 1000

# =============================================================================
# DESTINATIONS
# =============================================================================
# Every event is delivered to every destination, in the order listed here.
#
# File destinations ('parquet', 'json') write into a flat directory:
#   data-<unix>-<uuid>.<ext>.temp    batch being written
#   data-2024-01-01T10:00:00Z.<ext>  sealed batch
#   day-2024-01-01.<ext>             compacted day
#   <sealed name>.merged             batch already folded into its day file
#
# A batch is sealed when it holds more than max_rows events, when no event
# arrived for max_idle, or max_wait after it was opened. Empty batches are
# discarded.

destinations:
  - type: parquet
    dir: /var/lib/drain/parquet
    # Codec: none, snappy, lz4 or zstd
    compression: zstd
    batch:
      max_rows: 50000
      max_idle: 1m
      max_wait: 1h
    # Mirror events written here to the forwarding endpoint below
    forward: false

  - type: json
    # Gzipped newline-delimited JSON
    dir: /var/lib/drain/json
    batch:
      max_rows: 50000
      max_idle: 1m
      max_wait: 1h

  # Embedded database; inserts are best effort
  # - type: duckdb
  #   path: /var/lib/drain/events.duckdb
  #   batch_size: 1000
  #   flush_interval: 5s

# =============================================================================
# COMPACTION
# =============================================================================
# Merges sealed batches from previous UTC days into day-<date> files.
# Batches from the current day are never touched.

compaction:
  enabled: true
  interval: 24h
  # Also run one pass right after startup
  on_startup: false

# =============================================================================
# FORWARDING (optional)
# =============================================================================
# Best-effort copy of every event written by the destination marked
# 'forward: true' to a Measurement Protocol endpoint. Events are dropped,
# never delayed, when the queue is full.

# forwarding:
#   endpoint: https://www.google-analytics.com/mp/collect
#   measurement_id: $env{DRAIN_MEASUREMENT_ID}
#   api_secret: $env{DRAIN_API_SECRET}
#   event_name: eventStream
#   workers: 4
#   queue_size: 1024
#   timeout: 5s
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse::parse_config;
    use crate::config::DestinationConfig;

    #[test]
    fn test_starter_config_is_valid() {
        let config = parse_config(&generate_starter_config()).unwrap();
        assert_eq!(config.destinations.len(), 2);
        assert!(matches!(config.destinations[0], DestinationConfig::Parquet { .. }));
        assert!(matches!(config.destinations[1], DestinationConfig::Json { .. }));
        assert!(config.forwarding.is_none());
    }
}
