//! Extended-mode shadow filter: an ordered sequence of raw protocol segments rather than the
//! basic mode's typed layer tree. Replacing the segment type list clears and re-establishes
//! value/mask reads for every segment position.

use std::sync::Arc;

use chimera_transport::{Command, CommandToken, Transport, Value};

use crate::error::CoreError;

/// Which protocol a segment is shaped as; carried as an opaque wire string so new segment kinds
/// the device adds do not require a core-crate release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolType(pub String);

impl ProtocolType {
    pub fn new(name: impl Into<String>) -> Self {
        ProtocolType(name.into())
    }
}

/// One `{protocolType, value, mask}` entry, matched position-wise against up to 128 bytes of
/// packet prefix. `value`/`mask` are hex strings; callers must supply byte-widths consistent
/// with `protocol_type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolSegment {
    pub protocol_type: ProtocolType,
    pub value: String,
    pub mask: String,
}

/// The full extended-mode filter for one flow: an ordered sequence of segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowFilterConfigExtended {
    pub protocol_segments: Vec<ProtocolSegment>,
}

impl ShadowFilterConfigExtended {
    pub fn empty() -> Self {
        ShadowFilterConfigExtended { protocol_segments: Vec::new() }
    }
}

/// Drives the extended-mode segment list over the transport for one flow's shadow filter.
pub struct ExtendedModeConfigurator {
    transport: Arc<dyn Transport>,
    base_path: String,
}

impl ExtendedModeConfigurator {
    pub(crate) fn new(transport: Arc<dyn Transport>, shadow_filter_base_path: String) -> Self {
        ExtendedModeConfigurator { transport, base_path: format!("{shadow_filter_base_path}/extended") }
    }

    fn segment_type_list_path(&self) -> String {
        format!("{}/segments", self.base_path)
    }

    fn segment_value_path(&self, index: usize) -> String {
        format!("{}/segment/{index}/value", self.base_path)
    }

    fn segment_mask_path(&self, index: usize) -> String {
        format!("{}/segment/{index}/mask", self.base_path)
    }

    /// Read the ordered protocol-type list, then the value/mask of every segment in parallel.
    pub async fn get(&self) -> Result<ShadowFilterConfigExtended, CoreError> {
        let types_value = self.transport.execute(Command::Get(self.segment_type_list_path())).await?;
        let types = types_value
            .as_list()
            .ok_or_else(|| CoreError::Config("expected a segment type list".into()))?
            .iter()
            .map(|v| {
                v.as_str()
                    .map(ProtocolType::new)
                    .ok_or_else(|| CoreError::Config("bad segment protocol type".into()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut handles = Vec::with_capacity(types.len());
        for index in 0..types.len() {
            let transport = Arc::clone(&self.transport);
            let value_path = self.segment_value_path(index);
            let mask_path = self.segment_mask_path(index);
            handles.push(tokio::spawn(async move {
                let value = transport.execute(Command::Get(value_path)).await?;
                let mask = transport.execute(Command::Get(mask_path)).await?;
                Ok::<_, chimera_transport::TransportError>((value, mask))
            }));
        }

        let mut protocol_segments = Vec::with_capacity(types.len());
        for (protocol_type, handle) in types.into_iter().zip(handles) {
            let (value, mask) = handle.await.expect("extended-mode segment read task panicked")?;
            let value = value.as_hex().ok_or_else(|| CoreError::Config("bad segment value".into()))?.to_owned();
            let mask = mask.as_hex().ok_or_else(|| CoreError::Config("bad segment mask".into()))?.to_owned();
            protocol_segments.push(ProtocolSegment { protocol_type, value, mask });
        }

        Ok(ShadowFilterConfigExtended { protocol_segments })
    }

    /// Replace the segment type list first, then write value+mask for each segment in order.
    /// All commands are batched atomically.
    pub async fn set(&self, config: &ShadowFilterConfigExtended) -> Result<(), CoreError> {
        let mut tokens = Vec::with_capacity(1 + config.protocol_segments.len() * 2);
        tokens.push(CommandToken::set(
            "segments",
            self.segment_type_list_path(),
            Value::List(
                config
                    .protocol_segments
                    .iter()
                    .map(|s| Value::Str(s.protocol_type.0.clone()))
                    .collect(),
            ),
        ));
        for (index, segment) in config.protocol_segments.iter().enumerate() {
            tokens.push(CommandToken::set(
                format!("segment.{index}.value"),
                self.segment_value_path(index),
                Value::Hex(segment.value.clone()),
            ));
            tokens.push(CommandToken::set(
                format!("segment.{index}.mask"),
                self.segment_mask_path(index),
                Value::Hex(segment.mask.clone()),
            ));
        }
        self.transport.apply(tokens).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chimera_transport::MockTransport;

    fn configurator(transport: Arc<MockTransport>) -> ExtendedModeConfigurator {
        ExtendedModeConfigurator::new(transport, "t/0/m/0/p/0/f/0/shadow_filter".into())
    }

    #[tokio::test]
    async fn empty_segment_list_round_trips() {
        let transport = Arc::new(MockTransport::new());
        let cfg = configurator(transport);
        cfg.set(&ShadowFilterConfigExtended::empty()).await.unwrap();
        let read_back = cfg.get().await.unwrap();
        assert!(read_back.protocol_segments.is_empty());
    }

    #[tokio::test]
    async fn segments_round_trip_in_order() {
        let transport = Arc::new(MockTransport::new());
        let cfg = configurator(transport);
        let config = ShadowFilterConfigExtended {
            protocol_segments: vec![
                ProtocolSegment { protocol_type: ProtocolType::new("ethernet"), value: "aabbccddeeff".into(), mask: "f".repeat(12) },
                ProtocolSegment { protocol_type: ProtocolType::new("ipv4"), value: "0a000001".into(), mask: "f".repeat(8) },
            ],
        };
        cfg.set(&config).await.unwrap();
        let read_back = cfg.get().await.unwrap();
        assert_eq!(read_back, config);
    }
}
