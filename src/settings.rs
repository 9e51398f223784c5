//! Embedder-supplied initial HTTP/2 settings, merged into the engine's
//! defaults before the connection preface is sent.

/// Initial HTTP/2 settings an embedder may override. Any field left `None`
/// uses `h2`'s own default.
#[derive(Debug, Clone, Default)]
pub struct Http2Settings {
    /// `SETTINGS_INITIAL_WINDOW_SIZE` for new streams.
    pub initial_stream_window_size: Option<u32>,
    /// The connection-level flow-control window size.
    pub initial_connection_window_size: Option<u32>,
    /// `SETTINGS_MAX_CONCURRENT_STREAMS`.
    pub max_concurrent_streams: Option<u32>,
    /// `SETTINGS_MAX_FRAME_SIZE`.
    pub max_frame_size: Option<u32>,
    /// `SETTINGS_MAX_HEADER_LIST_SIZE`.
    pub max_header_list_size: Option<u32>,
}

impl Http2Settings {
    /// Applies these settings to an `h2` server builder, leaving any unset
    /// field at `h2`'s built-in default.
    pub fn apply(&self, builder: &mut h2::server::Builder) {
        if let Some(v) = self.initial_stream_window_size {
            builder.initial_window_size(v);
        }
        if let Some(v) = self.initial_connection_window_size {
            builder.initial_connection_window_size(v);
        }
        if let Some(v) = self.max_concurrent_streams {
            builder.max_concurrent_streams(v);
        }
        if let Some(v) = self.max_frame_size {
            builder.max_frame_size(v);
        }
        if let Some(v) = self.max_header_list_size {
            builder.max_header_list_size(v);
        }
    }
}
