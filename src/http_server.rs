use actix_web::{get, middleware, post, web, App, HttpResponse, HttpServer, Responder};
use serde::Deserialize;

use crate::bot::utils::deep_link;
use crate::config::AppConfig;
use crate::force_join::{self, ForceJoinRule};
use crate::registry::{self, Resolved};
use crate::store::{count_prefix, keys, Store};

pub struct PanelState {
    pub store: Store,
    pub config: AppConfig,
}

pub async fn run_http_server(store: Store, config: AppConfig) -> std::io::Result<()> {
    let port = config.port;
    tracing::info!("Starting HTTP server on port {}", port);

    let state = web::Data::new(PanelState { store, config });

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .service(health)
            .service(panel_root)
            .service(panel_get)
            .service(panel_post)
            .service(share_page)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}

#[get("/health")]
async fn health() -> impl Responder {
    "I'm ok"
}

#[derive(Deserialize)]
struct PanelQuery {
    key: Option<String>,
    flash: Option<String>,
}

#[derive(Deserialize)]
struct PanelForm {
    key: Option<String>,
    action: String,
    username: Option<String>,
    chat_id: Option<String>,
    invite: Option<String>,
    keys: Option<String>,
}

fn key_matches(config: &AppConfig, provided: Option<&str>) -> bool {
    match &config.panel_key {
        Some(expected) => provided == Some(expected.as_str()),
        None => true,
    }
}

#[get("/")]
async fn panel_root(state: web::Data<PanelState>, query: web::Query<PanelQuery>) -> HttpResponse {
    render_panel(&state, &query)
}

#[get("/panel")]
async fn panel_get(state: web::Data<PanelState>, query: web::Query<PanelQuery>) -> HttpResponse {
    render_panel(&state, &query)
}

fn render_panel(state: &PanelState, query: &PanelQuery) -> HttpResponse {
    if !key_matches(&state.config, query.key.as_deref()) {
        return HttpResponse::Unauthorized()
            .content_type("text/html; charset=utf-8")
            .body(auth_html());
    }

    let store = state.store.as_ref();
    // Connectivity probe doubles as the "store reachable" tile.
    let connected = store.get(keys::CONFIG_BOT_USERNAME).is_ok();
    let users = count_prefix(store, keys::USER_PREFIX);
    let media = count_prefix(store, keys::MEDIA_PREFIX);
    let bundles = count_prefix(store, keys::BUNDLE_PREFIX);
    let rules = force_join::load_rules(store);

    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(panel_html(
            connected,
            users,
            media,
            bundles,
            &rules,
            query.flash.as_deref().unwrap_or(""),
            query.key.as_deref().unwrap_or(""),
        ))
}

#[post("/panel")]
async fn panel_post(state: web::Data<PanelState>, form: web::Form<PanelForm>) -> HttpResponse {
    if !key_matches(&state.config, form.key.as_deref()) {
        return HttpResponse::Unauthorized()
            .content_type("text/html; charset=utf-8")
            .body(auth_html());
    }

    let store = state.store.as_ref();
    let flash = match form.action.as_str() {
        "add_username" => match form.username.as_deref().map(str::trim) {
            Some(username) if !username.is_empty() => {
                force_join::add_rule(store, ForceJoinRule::username(username));
                "Rule added.".to_string()
            }
            _ => "A username is required.".to_string(),
        },
        "add_private" => {
            let chat_id = form
                .chat_id
                .as_deref()
                .and_then(|raw| raw.trim().parse::<i64>().ok());
            match (chat_id, form.invite.as_deref().map(str::trim)) {
                (Some(chat_id), Some(invite)) if !invite.is_empty() => {
                    force_join::add_rule(
                        store,
                        ForceJoinRule::Private {
                            chat_id,
                            invite: invite.to_string(),
                        },
                    );
                    "Rule added.".to_string()
                }
                _ => "A chat id and an invite link are required.".to_string(),
            }
        }
        "delete_selected" => {
            let selected = form
                .keys
                .as_deref()
                .unwrap_or("")
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect();
            let removed = force_join::remove_rules(store, &selected);
            format!("{} rule(s) removed.", removed)
        }
        other => {
            tracing::warn!("Unknown panel action: {}", other);
            "Unknown action.".to_string()
        }
    };

    let mut location = format!("/panel?flash={}", urlencoding::encode(&flash));
    if let Some(key) = form.key.as_deref() {
        location.push_str(&format!("&key={}", urlencoding::encode(key)));
    }
    HttpResponse::SeeOther()
        .insert_header(("Location", location))
        .finish()
}

#[get("/s/{code}")]
async fn share_page(state: web::Data<PanelState>, path: web::Path<String>) -> HttpResponse {
    let code = path.into_inner();
    let store = state.store.as_ref();

    let (status, body) = match registry::resolve(store, &code) {
        Resolved::None => (
            HttpResponse::NotFound(),
            share_html(&code, "This share code does not exist.", None),
        ),
        Resolved::Media(entry) if entry.disabled => (
            HttpResponse::Ok(),
            share_html(&code, "This link has been disabled.", None),
        ),
        Resolved::Bundle(bundle) if bundle.items.is_empty() => (
            HttpResponse::NotFound(),
            share_html(&code, "This share code does not exist.", None),
        ),
        Resolved::Bundle(bundle) if bundle.disabled => (
            HttpResponse::Ok(),
            share_html(&code, "This link has been disabled.", None),
        ),
        _ => {
            let username = store
                .get(keys::CONFIG_BOT_USERNAME)
                .ok()
                .flatten()
                .unwrap_or_default();
            let link = deep_link(&username, &code);
            (
                HttpResponse::Ok(),
                share_html(&code, "Open the bot to receive the content.", Some(&link)),
            )
        }
    };

    let mut response = status;
    response
        .content_type("text/html; charset=utf-8")
        .body(body)
}

const PAGE_STYLE: &str = "body{font-family:system-ui,sans-serif;background:#10141f;color:#eaf0ff;\
margin:0;display:flex;min-height:100vh;align-items:center;justify-content:center}\
.card{background:#1a2030;border:1px solid #2a3350;border-radius:12px;padding:24px;\
max-width:560px;width:90%}a.btn{display:inline-block;background:#2b59ff;color:#fff;\
padding:10px 18px;border-radius:8px;text-decoration:none;margin-top:12px}\
table{width:100%;border-collapse:collapse;margin:12px 0}td,th{padding:6px;border-bottom:1px solid #2a3350;text-align:left}\
input,select{background:#10141f;color:#eaf0ff;border:1px solid #2a3350;border-radius:6px;padding:6px}\
button{background:#2b59ff;color:#fff;border:0;border-radius:6px;padding:8px 14px;margin-top:8px}";

fn auth_html() -> String {
    format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>Panel</title>\
         <style>{}</style></head><body><div class=\"card\"><h1>Panel</h1>\
         <p>A panel key is required.</p>\
         <form method=\"get\" action=\"/panel\">\
         <input type=\"password\" name=\"key\" placeholder=\"key\">\
         <button type=\"submit\">Enter</button></form></div></body></html>",
        PAGE_STYLE
    )
}

fn panel_html(
    connected: bool,
    users: usize,
    media: usize,
    bundles: usize,
    rules: &[ForceJoinRule],
    flash: &str,
    key: &str,
) -> String {
    let mut rule_rows = String::new();
    for rule in rules {
        rule_rows.push_str(&format!(
            "<tr><td>{}</td><td><code>{}</code></td></tr>",
            html_escape::encode_safe(&rule.label()),
            html_escape::encode_safe(&rule.key())
        ));
    }
    if rule_rows.is_empty() {
        rule_rows = "<tr><td colspan=\"2\">No rules configured.</td></tr>".to_string();
    }

    let flash_html = if flash.is_empty() {
        String::new()
    } else {
        format!("<p><strong>{}</strong></p>", html_escape::encode_safe(flash))
    };

    format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>Panel</title>\
         <style>{style}</style></head><body><div class=\"card\">\
         <h1>Bot panel</h1>{flash}\
         <table><tr><th>Store</th><td>{store}</td></tr>\
         <tr><th>Users</th><td>{users}</td></tr>\
         <tr><th>Media links</th><td>{media}</td></tr>\
         <tr><th>Bundles</th><td>{bundles}</td></tr></table>\
         <h2>Force-join rules</h2>\
         <table><tr><th>Channel</th><th>Key</th></tr>{rules}</table>\
         <form method=\"post\" action=\"/panel\">\
         <input type=\"hidden\" name=\"key\" value=\"{key}\">\
         <input type=\"hidden\" name=\"action\" value=\"add_username\">\
         <input name=\"username\" placeholder=\"channel username\">\
         <button type=\"submit\">Add public rule</button></form>\
         <form method=\"post\" action=\"/panel\">\
         <input type=\"hidden\" name=\"key\" value=\"{key}\">\
         <input type=\"hidden\" name=\"action\" value=\"add_private\">\
         <input name=\"chat_id\" placeholder=\"chat id\">\
         <input name=\"invite\" placeholder=\"invite link\">\
         <button type=\"submit\">Add private rule</button></form>\
         <form method=\"post\" action=\"/panel\">\
         <input type=\"hidden\" name=\"key\" value=\"{key}\">\
         <input type=\"hidden\" name=\"action\" value=\"delete_selected\">\
         <input name=\"keys\" placeholder=\"keys, comma separated\">\
         <button type=\"submit\">Delete rules</button></form>\
         </div></body></html>",
        style = PAGE_STYLE,
        flash = flash_html,
        store = if connected { "connected" } else { "unreachable" },
        users = users,
        media = media,
        bundles = bundles,
        rules = rule_rows,
        key = html_escape::encode_safe(key),
    )
}

fn share_html(code: &str, message: &str, link: Option<&str>) -> String {
    let button = match link {
        Some(link) => format!(
            "<a class=\"btn\" href=\"{}\">Open in Telegram</a>",
            html_escape::encode_safe(link)
        ),
        None => String::new(),
    };
    format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>Share</title>\
         <style>{}</style></head><body><div class=\"card\">\
         <h1>Share code: {}</h1><p>{}</p>{}</div></body></html>",
        PAGE_STYLE,
        html_escape::encode_safe(code),
        html_escape::encode_safe(message),
        button
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(panel_key: Option<&str>) -> AppConfig {
        AppConfig {
            bot_token: "token".to_string(),
            owner_ids: vec![1],
            database_url: "postgres://unused".to_string(),
            panel_key: panel_key.map(str::to_string),
            port: 8080,
        }
    }

    #[test]
    fn panel_key_gate() {
        let open = config(None);
        assert!(key_matches(&open, None));
        assert!(key_matches(&open, Some("anything")));

        let gated = config(Some("s3cret"));
        assert!(!key_matches(&gated, None));
        assert!(!key_matches(&gated, Some("wrong")));
        assert!(key_matches(&gated, Some("s3cret")));
    }

    #[test]
    fn panel_lists_rules_and_escapes_the_flash() {
        let rules = vec![ForceJoinRule::username("chA")];
        let body = panel_html(true, 3, 2, 1, &rules, "<b>done</b>", "k");
        assert!(body.contains("@chA"));
        assert!(body.contains("u:chA"));
        assert!(body.contains("&lt;b&gt;done&lt;/b&gt;"));
        assert!(!body.contains("<b>done</b>"));
    }

    #[test]
    fn share_page_omits_the_button_without_a_link() {
        let body = share_html("ab12", "gone", None);
        assert!(!body.contains("class=\"btn\""));
        let body = share_html("ab12", "ready", Some("https://t.me/bot?start=ab12"));
        assert!(body.contains("class=\"btn\""));
    }
}
