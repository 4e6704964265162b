/// Unwrap a result, panic with the `Display` of the error if it is an `Err`.
macro_rules! panic_on_err {
    ($expr:expr) => {
        match $expr {
            Ok(x) => x,
            Err(err) => panic!("{err}"),
        }
    };
}

/// Unwrap a result contianing an `Infallible`.
macro_rules! unwrap_infallible {
    ($expr:expr) => {
        match $expr {
            Ok(x) => x,
            Err(_) => unreachable!("Infallible"),
        }
    };
}

/// Log a chat message event to the current span.
///
/// Modeled on the OpenTelemetry RPC message events, see
/// <https://github.com/open-telemetry/semantic-conventions/blob/d66109ff41e75f49587114e5bff9d101b87f40bd/docs/rpc/rpc-spans.md#events>
macro_rules! message_event {
    ($type:literal, counter: $counter:expr, bytes: $bytes:expr,) => {{
        ::tracing::debug!(
            "chat.message.id" = $counter.fetch_add(1, ::std::sync::atomic::Ordering::Relaxed),
            "chat.message.type" = $type,
            "chat.message.size" = $bytes,
            "chat.message"
        );
    }};

    (@received, counter: $counter:expr, bytes: $bytes:expr, ) => {
        message_event!("RECEIVED", counter: $counter, bytes: $bytes,);
    };

    (@sent, counter: $counter:expr, bytes: $bytes:expr, ) => {
        message_event!("SENT", counter: $counter, bytes: $bytes,);
    };
}
