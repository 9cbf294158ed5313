use std::fmt::Write as _;
use std::sync::Arc;

use actix_web::{HttpRequest, HttpResponse, Responder, guard, http::Method, web};
use serde::Serialize;

use crate::controller::DeviceController;
use crate::error::AppError;
use crate::gpio::GpioBackend;

pub struct AppState<B: GpioBackend + ?Sized> {
    pub controller: Arc<DeviceController<B>>,
    pub api_path: String,
}

impl<B: GpioBackend + ?Sized> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            controller: Arc::clone(&self.controller),
            api_path: self.api_path.clone(),
        }
    }
}

#[derive(Serialize)]
struct PinLevel {
    id: u32,
    level: Option<bool>,
}

impl<B: GpioBackend + ?Sized + 'static> AppState<B> {
    pub fn new(controller: Arc<DeviceController<B>>, api_path: impl Into<String>) -> Self {
        Self {
            controller,
            api_path: api_path.into(),
        }
    }

    pub fn api_scope(&self) -> actix_web::Scope {
        web::scope(&self.api_path)
            .service(
                web::resource("/devices")
                    .route(web::get().to(list_devices::<B>))
                    .route(
                        web::route()
                            .guard(guard_not_methods(&[Method::GET]))
                            .to(method_not_allowed),
                    ),
            )
            .service(
                web::resource("/devices/{id}")
                    .route(web::get().to(get_device::<B>))
                    .route(web::post().to(toggle_device::<B>))
                    .route(
                        web::route()
                            .guard(guard_not_methods(&[Method::GET, Method::POST]))
                            .to(method_not_allowed),
                    ),
            )
            .service(
                web::resource("/devices/{id}/level")
                    .route(web::get().to(get_pin_level::<B>))
                    .route(
                        web::route()
                            .guard(guard_not_methods(&[Method::GET]))
                            .to(method_not_allowed),
                    ),
            )
    }

    /// The control page served at the site root.
    pub fn page_resource(&self) -> actix_web::Resource {
        web::resource("/")
            .route(web::get().to(control_page::<B>))
            .route(
                web::route()
                    .guard(guard_not_methods(&[Method::GET]))
                    .to(method_not_allowed),
            )
    }
}

async fn list_devices<B: GpioBackend + ?Sized + 'static>(
    state: web::Data<AppState<B>>,
) -> Result<impl Responder, AppError> {
    Ok(web::Json(state.controller.list()))
}

async fn get_device<B: GpioBackend + ?Sized + 'static>(
    req: HttpRequest,
    state: web::Data<AppState<B>>,
) -> Result<impl Responder, AppError> {
    let id = parse_device_id(&req)?;
    let device = state.controller.get(id)?;

    Ok(web::Json(device))
}

async fn toggle_device<B: GpioBackend + ?Sized + 'static>(
    req: HttpRequest,
    state: web::Data<AppState<B>>,
) -> Result<impl Responder, AppError> {
    let id = parse_device_id(&req)?;
    let device = state.controller.toggle(id)?;

    Ok(web::Json(device))
}

async fn get_pin_level<B: GpioBackend + ?Sized + 'static>(
    req: HttpRequest,
    state: web::Data<AppState<B>>,
) -> Result<impl Responder, AppError> {
    let id = parse_device_id(&req)?;
    let level = state.controller.pin_level(id)?;

    Ok(web::Json(PinLevel { id, level }))
}

async fn control_page<B: GpioBackend + ?Sized + 'static>(
    state: web::Data<AppState<B>>,
) -> HttpResponse {
    let api = state.api_path.trim_end_matches('/');
    let mut rows = String::new();
    for device in state.controller.list() {
        let _ = write!(
            rows,
            r#"<li><span id="state-{id}">{status}</span> {name} <button onclick="toggle({id})">Toggle</button></li>"#,
            id = device.id,
            status = if device.active { "ON" } else { "OFF" },
            name = escape_html(&device.name),
        );
    }

    let body = format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Devices</title></head>
<body>
<h1>Devices</h1>
<ul>{rows}</ul>
<script>
function toggle(id) {{
  fetch("{api}/devices/" + id, {{ method: "POST" }})
    .then(r => r.json())
    .then(d => {{
      if (d.error) {{ alert(d.error); return; }}
      document.getElementById("state-" + d.id).textContent = d.active ? "ON" : "OFF";
    }});
}}
</script>
</body>
</html>"#
    );

    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(body)
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn parse_device_id(req: &HttpRequest) -> Result<u32, AppError> {
    let id = req
        .match_info()
        .get("id")
        .ok_or_else(|| AppError::InvalidValue("Missing device id".into()))?;
    let id = id
        .parse::<u32>()
        .map_err(|_| AppError::InvalidValue("Invalid device id".into()))?;

    Ok(id)
}

async fn method_not_allowed() -> HttpResponse {
    HttpResponse::MethodNotAllowed().finish()
}

fn guard_not_methods(methods: &[Method]) -> impl guard::Guard {
    let allowed: Vec<Method> = methods.to_vec();
    guard::fn_guard(move |ctx| !allowed.iter().any(|m| m == ctx.head().method))
}
