use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;
use voice_session_engine::audio::capture::CAPTURE_BLOCK_SIZE;
use voice_session_engine::audio::codec::PcmFormat;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let config = &state.config;
    let snapshot = state.snapshot();
    let controller_running = state.session.is_running();

    HttpResponse::Ok().json(json!({
        "status": if controller_running { "healthy" } else { "degraded" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "session": {
            "controller_running": controller_running,
            "state": snapshot,
            "status_line": snapshot.status.label()
        },
        "transport": {
            "endpoint": config.transport.endpoint,
            "api_key_configured": config.has_api_key()
        },
        "audio": {
            "capture": format_info(PcmFormat::CAPTURE),
            "playback": format_info(PcmFormat::PLAYBACK),
            "block_size": CAPTURE_BLOCK_SIZE,
            "input_path": config.device.input_path,
            "output_path": config.device.output_path
        },
        "memory": get_memory_info()
    }))
}

fn format_info(format: PcmFormat) -> serde_json::Value {
    json!({
        "mime_type": format.mime_type(),
        "sample_rate": format.sample_rate,
        "channels": format.channels,
        "bit_depth": 16
    })
}

fn get_memory_info() -> serde_json::Value {
    #[cfg(target_os = "linux")]
    {
        let pid = std::process::id();
        if let Ok(status) = std::fs::read_to_string(format!("/proc/{}/status", pid)) {
            let read_kb = |key: &str| {
                status
                    .lines()
                    .find(|line| line.starts_with(key))
                    .and_then(|line| line.split_whitespace().nth(1))
                    .and_then(|kb| kb.parse::<u64>().ok())
                    .unwrap_or(0)
                    * 1024
            };

            return json!({
                "resident_memory_bytes": read_kb("VmRSS:"),
                "virtual_memory_bytes": read_kb("VmSize:"),
                "available": true
            });
        }
    }

    json!({
        "resident_memory_bytes": 0,
        "virtual_memory_bytes": 0,
        "available": false,
        "note": "Memory info not available on this platform"
    })
}
