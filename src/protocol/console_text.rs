//! Rendering `Runtime.consoleAPICalled` arguments as text

use chromiumoxide::cdp::js_protocol::runtime::{ObjectPreviewSubtype, RemoteObject};

/// Per-argument byte cap applied at capture time so a runaway `console.log`
/// cannot grow a connection's buffer without bound
pub(crate) const MAX_ARG_BYTES: usize = 10_000;

/// Join all arguments of one console call into a single line
pub(crate) fn render_args(args: &[RemoteObject]) -> String {
    args.iter().map(render_arg).collect::<Vec<_>>().join(" ")
}

/// Text for one argument, preferring the most faithful field available:
/// `value`, then `preview`, then `description`, then `unserializableValue`.
pub(crate) fn render_arg(arg: &RemoteObject) -> String {
    let raw = if let Some(value) = &arg.value {
        match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    } else if let Some(preview) = &arg.preview {
        let is_array = matches!(preview.subtype, Some(ObjectPreviewSubtype::Array));
        let entries: Vec<String> = preview
            .properties
            .iter()
            .map(|p| {
                let value = p.value.as_deref().unwrap_or("…");
                if is_array {
                    value.to_string()
                } else {
                    format!("{}: {value}", p.name)
                }
            })
            .collect();
        let more = if preview.overflow { ", …" } else { "" };
        if is_array {
            format!("[{}{more}]", entries.join(", "))
        } else {
            format!("{{{}{more}}}", entries.join(", "))
        }
    } else if let Some(description) = &arg.description {
        description.clone()
    } else if let Some(unserializable) = &arg.unserializable_value {
        unserializable.inner().clone()
    } else {
        String::from("[unknown]")
    };
    truncate_at_char_boundary(raw, MAX_ARG_BYTES)
}

/// Cut `s` to at most `max_bytes` on a UTF-8 boundary, marking the cut with `…`
pub(crate) fn truncate_at_char_boundary(s: String, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    let mut cut = s;
    cut.truncate(end);
    cut.push('…');
    cut
}
