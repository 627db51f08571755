//! HTML pages: the share picker at `/` and per-directory listings.
//!
//! Every string that comes from the filesystem or from the control state is
//! passed through [`escape_html`] before it is embedded.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::utils::escape_html;

/// Characters left as-is in an entry link. Everything else, `/` included,
/// is percent-encoded.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

static DEFAULT_PREVIEW_EXTENSIONS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        // text and code
        ".txt", ".log", ".py", ".js", ".css", ".html", ".htm", ".json", ".xml", ".md", ".ini",
        ".cfg", ".yml", ".yaml",
        // images
        ".png", ".jpg", ".jpeg", ".gif", ".bmp", ".webp", ".svg",
        // audio
        ".mp3", ".wav", ".ogg", ".aac",
        // video
        ".mp4", ".webm", ".mov", ".avi", ".mkv", ".flv",
    ]
    .into_iter()
    .collect()
});

/// Extensions the browser may open directly instead of behind a download prompt.
#[derive(Debug, Clone)]
pub struct PreviewSet {
    extensions: HashSet<String>,
}

impl Default for PreviewSet {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl PreviewSet {
    /// Built-in list plus `extra` (lowercase, with leading dot).
    pub fn new(extra: &[String]) -> Self {
        let mut extensions: HashSet<String> = DEFAULT_PREVIEW_EXTENSIONS
            .iter()
            .map(|ext| ext.to_string())
            .collect();
        extensions.extend(extra.iter().cloned());
        Self { extensions }
    }

    pub fn is_previewable(&self, name: &str) -> bool {
        Path::new(name)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
            .is_some_and(|ext| self.extensions.contains(&ext))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Directories first, then files; each group case-insensitively by name.
pub fn sort_entries(entries: &mut [DirEntry]) {
    entries.sort_by_cached_key(|entry| (!entry.is_dir, entry.name.to_lowercase()));
}

/// Read and sort the entries of `dir`. Symlinks are classified by their target.
pub async fn read_entries(dir: &Path) -> std::io::Result<Vec<DirEntry>> {
    let mut reader = tokio::fs::read_dir(dir).await?;
    let mut entries = Vec::new();

    while let Some(entry) = reader.next_entry().await? {
        let is_dir = match tokio::fs::metadata(entry.path()).await {
            Ok(metadata) => metadata.is_dir(),
            // Dangling symlink or a racing delete: list it as a plain file.
            Err(_) => false,
        };
        entries.push(DirEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir,
        });
    }

    sort_entries(&mut entries);
    Ok(entries)
}

/// Card title for a share: its last path segment, or the whole path.
pub fn share_display_name(root: &Path) -> String {
    root.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| root.display().to_string())
}

fn shorten_path(path: &str) -> String {
    const MAX: usize = 50;
    const KEEP: usize = 47;

    let count = path.chars().count();
    if count <= MAX {
        return path.to_string();
    }
    let tail: String = path.chars().skip(count - KEEP).collect();
    format!("...{}", tail)
}

fn entry_href(entry: &DirEntry) -> String {
    let encoded = utf8_percent_encode(&entry.name, PATH_SEGMENT).to_string();
    if entry.is_dir {
        format!("{}/", encoded)
    } else {
        encoded
    }
}

// ============= Pages =============

pub fn render_root(shares: &[PathBuf], status: &str) -> String {
    let mut html = String::with_capacity(16 * 1024);
    push_head(&mut html, "LAN File Share - Choose a folder", ROOT_STYLE);

    push_control_bar(&mut html, status);

    html.push_str("<div class=\"header\">\n<h1>LAN File Share</h1>\n");
    html.push_str(&format!(
        "<p>{} shared folder{}, choose one to open:</p>\n</div>\n",
        shares.len(),
        if shares.len() == 1 { "" } else { "s" }
    ));

    html.push_str("<div class=\"dir-list\">\n");
    for (i, root) in shares.iter().enumerate() {
        let full_path = root.display().to_string();
        html.push_str(&format!(
            concat!(
                "<a href=\"/share{index}/\" class=\"dir-item\">",
                "<div class=\"folder-icon\"></div>",
                "<div class=\"dir-info\">",
                "<div class=\"dir-name\">{name}</div>",
                "<div class=\"dir-path\" title=\"{title}\">{path}</div>",
                "</div>",
                "<div class=\"arrow\">&rarr;</div>",
                "</a>\n"
            ),
            index = i + 1,
            name = escape_html(&share_display_name(root)),
            title = escape_html(&full_path),
            path = escape_html(&shorten_path(&full_path)),
        ));
    }
    html.push_str("</div>\n");

    html.push_str(
        "<div class=\"footer\"><p>Add more folders from the desktop window.</p></div>\n",
    );

    html.push_str(MESSAGE_MODALS);
    html.push_str(SHUTDOWN_MODAL);
    html.push_str("<script>\n");
    html.push_str(COMMON_SCRIPT);
    html.push_str("</script>\n</body>\n</html>\n");
    html
}

/// Everything a directory page needs.
pub struct DirectoryView<'a> {
    /// Human-readable location, e.g. `share1/photos/2024/`.
    pub location: &'a str,
    pub entries: &'a [DirEntry],
    pub is_share_root: bool,
    pub status: &'a str,
    pub preview: &'a PreviewSet,
}

pub fn render_directory(view: &DirectoryView<'_>) -> String {
    let mut html = String::with_capacity(16 * 1024 + view.entries.len() * 96);
    push_head(&mut html, "LAN File Share", LISTING_STYLE);

    html.push_str(
        "<div class=\"header\"><button class=\"normal-btn\" onclick=\"window.location.href='/'\">Back to folders</button></div>\n",
    );

    push_control_bar(&mut html, view.status);

    html.push_str(concat!(
        "<div class=\"header\">",
        "<button class=\"normal-btn\" onclick=\"showModal('createFileModal')\">New file</button>",
        "<button class=\"normal-btn\" onclick=\"showModal('createDirModal')\">New folder</button>",
        "<button class=\"normal-btn\" onclick=\"showModal('uploadModal')\">Upload file</button>",
        "</div>\n"
    ));

    html.push_str("<div class=\"file-list\">\n");
    html.push_str(&format!(
        "<h2>Folder: {}</h2>\n<ul>\n",
        escape_html(view.location)
    ));

    if !view.is_share_root {
        html.push_str("<li><a href=\"../\">../</a></li>\n");
    }

    for entry in view.entries {
        let href = escape_html(&entry_href(entry));
        let label = if entry.is_dir {
            escape_html(&format!("{}/", entry.name))
        } else {
            escape_html(&entry.name)
        };

        if entry.is_dir || view.preview.is_previewable(&entry.name) {
            html.push_str(&format!("<li><a href=\"{}\">{}</a></li>\n", href, label));
        } else {
            html.push_str(&format!(
                "<li><a href=\"{}\" data-name=\"{}\" onclick=\"return confirmDownload(this)\">{}</a></li>\n",
                href,
                escape_html(&entry.name),
                label
            ));
        }
    }
    html.push_str("</ul>\n</div>\n");

    html.push_str(MESSAGE_MODALS);
    html.push_str(SHUTDOWN_MODAL);
    html.push_str(FILE_MODALS);
    html.push_str("<script>\n");
    html.push_str(COMMON_SCRIPT);
    html.push_str(FILE_SCRIPT);
    html.push_str("</script>\n</body>\n</html>\n");
    html
}

fn push_head(html: &mut String, title: &str, style: &str) {
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str(
        "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n",
    );
    html.push_str(&format!("<title>{}</title>\n", escape_html(title)));
    html.push_str("<style>\n");
    html.push_str(BASE_STYLE);
    html.push_str(style);
    html.push_str("</style>\n</head>\n<body>\n");
}

fn push_control_bar(html: &mut String, status: &str) {
    html.push_str("<div class=\"shutdown-section\">\n");
    html.push_str(&format!(
        "<div class=\"shutdown-status\" id=\"shutdownStatus\">{}</div>\n",
        escape_html(status)
    ));
    html.push_str(concat!(
        "<button class=\"shutdown-btn\" onclick=\"showModal('shutdownModal')\">Shut down</button>\n",
        "<button class=\"cancel-shutdown-btn\" onclick=\"cancelShutdown()\">Cancel shutdown</button>\n",
        "<button class=\"send-text-btn\" onclick=\"showSendTextModal()\">Send text</button>\n",
        "</div>\n"
    ));
}

// ============= Static assets =============

const BASE_STYLE: &str = r#"
body { font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif; background-color: #f5f5f5; margin: 0; }
button { cursor: pointer; }
.shutdown-section { text-align: center; margin: 15px 0; padding: 12px; background: white; border-radius: 8px; box-shadow: 0 1px 5px rgba(0,0,0,0.1); }
.shutdown-status { font-size: 16px; color: #d9534f; min-height: 24px; margin-bottom: 8px; }
.shutdown-btn, .cancel-shutdown-btn, .send-text-btn { color: black; border: none; padding: 10px 16px; font-size: 16px; border-radius: 6px; min-width: 79px; }
.shutdown-btn { background-color: #d9534f; }
.cancel-shutdown-btn { background-color: #5cb85c; }
.send-text-btn { background-color: #FFC107; }
.modal { display: none; position: fixed; z-index: 1000; left: 0; top: 0; width: 100%; height: 100%; background-color: rgba(0,0,0,0.5); }
.modal-content { background-color: white; margin: 10% auto; padding: 20px; border-radius: 10px; width: 90%; max-width: 500px; box-sizing: border-box; }
.modal input { width: 100%; padding: 10px; margin: 8px 0; box-sizing: border-box; }
.modal textarea { width: 100%; padding: 10px; margin: 10px 0; box-sizing: border-box; border: 1px solid #ccc; border-radius: 6px; min-height: 150px; font-size: 14px; font-family: inherit; }
.modal button { padding: 10px 20px; font-size: 14px; border: none; border-radius: 6px; margin: 5px; }
.modal .confirm-btn { background-color: #4CAF50; color: white; }
.modal .cancel-btn { background-color: #f44336; color: white; }
.modal .clipboard-btn { background-color: #FF9800; color: white; }
.modal .copy-btn { background-color: #2196F3; color: white; }
.modal .close-btn { background-color: #9E9E9E; color: white; }
.result-ok { color: green; }
.result-error { color: red; }
"#;

const ROOT_STYLE: &str = r#"
body { padding: 20px; max-width: 800px; margin: 0 auto; }
.header { text-align: center; margin-bottom: 30px; }
.header h1 { color: #333; margin-bottom: 10px; }
.dir-list { background: white; border-radius: 10px; overflow: hidden; box-shadow: 0 2px 10px rgba(0,0,0,0.1); }
.dir-item { padding: 20px; border-bottom: 1px solid #eee; display: flex; align-items: center; text-decoration: none; color: #333; }
.dir-item:hover { background-color: #f9f9f9; }
.dir-item:last-child { border-bottom: none; }
.folder-icon { width: 40px; height: 40px; background-color: #4CAF50; border-radius: 8px; margin-right: 15px; flex-shrink: 0; display: flex; align-items: center; justify-content: center; }
.folder-icon::before { content: "\1F4C1"; font-size: 20px; }
.dir-info { flex-grow: 1; min-width: 0; }
.dir-name { font-size: 18px; font-weight: bold; margin-bottom: 5px; }
.dir-path { font-size: 14px; color: #666; overflow: hidden; text-overflow: ellipsis; }
.arrow { color: #999; font-size: 18px; }
.footer { text-align: center; margin-top: 30px; color: #666; font-size: 14px; }
"#;

const LISTING_STYLE: &str = r#"
body { padding: 16px; }
.header { display: flex; gap: 10px; flex-wrap: wrap; margin-bottom: 20px; justify-content: center; }
.header button { padding: 10px 16px; font-size: 16px; border: none; border-radius: 6px; color: white; min-width: 100px; }
.normal-btn { background-color: #007aff; }
.file-list { background: white; border-radius: 10px; overflow: hidden; box-shadow: 0 2px 10px rgba(0,0,0,0.1); }
.file-list h2 { padding: 16px; margin: 0; border-bottom: 1px solid #eee; font-size: 18px; word-break: break-all; }
.file-list ul { list-style: none; padding: 0; margin: 0; }
.file-list li { padding: 12px 16px; border-bottom: 1px solid #eee; }
.file-list li:last-child { border-bottom: none; }
.file-list a { text-decoration: none; color: #007aff; font-size: 16px; display: block; word-break: break-all; }
@media (max-width: 600px) { .header button { font-size: 14px; padding: 8px 12px; } }
"#;

const MESSAGE_MODALS: &str = r#"
<div id="sendTextModal" class="modal"><div class="modal-content">
<h3>Send text to the computer</h3>
<textarea id="sendTextArea" placeholder="Type the text to send..."></textarea>
<div style="text-align: center;">
<button class="clipboard-btn" onclick="pasteFromClipboard()">Paste</button>
<button class="cancel-btn" onclick="closeModal('sendTextModal')">Cancel</button>
<button class="confirm-btn" onclick="sendText()">Send</button>
</div>
<p id="sendTextResult" style="text-align: center;"></p>
</div></div>
<div id="receiveTextModal" class="modal"><div class="modal-content">
<h3>Message from the computer</h3>
<p id="receiveMessage"></p>
<textarea id="receiveTextArea" readonly></textarea>
<div style="text-align: center;">
<button class="copy-btn" onclick="copyReceived()">Copy</button>
<button class="close-btn" onclick="closeModal('receiveTextModal')">Close</button>
</div>
</div></div>
"#;

const SHUTDOWN_MODAL: &str = r#"
<div id="shutdownModal" class="modal"><div class="modal-content">
<h3>Schedule shutdown</h3>
<input type="number" id="shutdownSeconds" placeholder="Seconds, e.g. 100" min="1">
<button class="confirm-btn" onclick="scheduleShutdown()">Shut down</button>
<button class="close-btn" onclick="closeModal('shutdownModal')">Cancel</button>
<p id="shutdownResult"></p>
</div></div>
"#;

const FILE_MODALS: &str = r#"
<div id="createFileModal" class="modal"><div class="modal-content">
<h3>New .txt file</h3>
<input type="text" id="newFileName" placeholder="e.g. notes.txt">
<textarea id="newFileContent" placeholder="Content (optional)"></textarea>
<button class="confirm-btn" onclick="createFile()">Create</button>
<button class="close-btn" onclick="closeModal('createFileModal')">Cancel</button>
<p id="createFileResult"></p>
</div></div>
<div id="createDirModal" class="modal"><div class="modal-content">
<h3>New folder</h3>
<input type="text" id="newDirName" placeholder="e.g. My folder">
<button class="confirm-btn" onclick="createDir()">Create</button>
<button class="close-btn" onclick="closeModal('createDirModal')">Cancel</button>
<p id="createDirResult"></p>
</div></div>
<div id="uploadModal" class="modal"><div class="modal-content">
<h3>Upload file</h3>
<input type="file" id="uploadFileInput" onchange="showChosenFile(this)">
<div id="uploadFileName" style="margin: 8px 0; font-size: 14px; color: #666;"></div>
<button class="confirm-btn" id="uploadBtn" onclick="uploadFile()">Upload</button>
<button class="close-btn" onclick="closeModal('uploadModal')">Cancel</button>
<p id="uploadResult"></p>
</div></div>
"#;

const COMMON_SCRIPT: &str = r#"
let receivedText = null;

function showModal(id) { document.getElementById(id).style.display = 'block'; }

function closeModal(id) {
    document.getElementById(id).style.display = 'none';
    document.querySelectorAll('#' + id + ' input, #' + id + ' textarea').forEach(el => {
        if (!el.readOnly) el.value = '';
    });
    document.querySelectorAll('#' + id + ' p[id$="Result"]').forEach(el => el.textContent = '');
}

function showResult(id, ok, text) {
    const el = document.getElementById(id);
    el.className = ok ? 'result-ok' : 'result-error';
    el.textContent = text;
}

async function failureText(res) {
    try {
        const body = await res.json();
        if (body && body.message) return body.message;
    } catch (e) {}
    return 'HTTP ' + res.status;
}

function postJson(url, payload) {
    return fetch(url, {
        method: 'POST',
        headers: {'Content-Type': 'application/json'},
        body: JSON.stringify(payload)
    });
}

function updateStatus() {
    fetch('/api/shutdown_status')
        .then(res => res.json())
        .then(data => { document.getElementById('shutdownStatus').textContent = data.status; })
        .catch(() => {});
}

async function scheduleShutdown() {
    const raw = document.getElementById('shutdownSeconds').value.trim();
    const seconds = parseInt(raw, 10);
    if (!/^\d+$/.test(raw) || seconds <= 0) {
        showResult('shutdownResult', false, 'Enter a positive whole number of seconds.');
        return;
    }
    try {
        const res = await postJson('/api/shutdown', {seconds: seconds});
        if (!res.ok) throw new Error(await failureText(res));
        showResult('shutdownResult', true, 'Shutdown scheduled.');
        setTimeout(() => { closeModal('shutdownModal'); updateStatus(); }, 1000);
    } catch (err) {
        showResult('shutdownResult', false, 'Error: ' + err.message);
    }
}

async function cancelShutdown() {
    if (!confirm('Cancel the scheduled shutdown?')) return;
    try {
        const res = await fetch('/api/cancel_shutdown', {method: 'POST'});
        if (!res.ok) throw new Error(await failureText(res));
        updateStatus();
    } catch (err) {
        alert('Cancel failed: ' + err.message);
    }
}

function showSendTextModal() { showModal('sendTextModal'); }

function pasteFromClipboard() {
    if (navigator.clipboard && navigator.clipboard.readText) {
        navigator.clipboard.readText()
            .then(text => { document.getElementById('sendTextArea').value = text; })
            .catch(err => alert('Clipboard is not accessible: ' + err));
    } else {
        alert('Clipboard access is not supported here, paste manually.');
    }
}

async function sendText() {
    const text = document.getElementById('sendTextArea').value.trim();
    if (!text) {
        showResult('sendTextResult', false, 'Type some text first.');
        return;
    }
    try {
        const res = await postJson('/api/send_text', {text: text});
        if (!res.ok) throw new Error(await failureText(res));
        showResult('sendTextResult', true, 'Text sent.');
        setTimeout(() => closeModal('sendTextModal'), 1000);
    } catch (err) {
        showResult('sendTextResult', false, 'Send failed: ' + err.message);
    }
}

function copyReceived() {
    if (!receivedText) return;
    if (navigator.clipboard && navigator.clipboard.writeText) {
        navigator.clipboard.writeText(receivedText)
            .then(() => alert('Copied to clipboard.'))
            .catch(err => alert('Copy failed: ' + err));
    } else {
        const area = document.getElementById('receiveTextArea');
        area.select();
        document.execCommand('copy');
        alert('Copied to clipboard.');
    }
}

function checkForMessages() {
    fetch('/api/check_message')
        .then(res => res.ok ? res.json() : null)
        .then(data => {
            if (data && data.has_message) {
                receivedText = data.text;
                document.getElementById('receiveMessage').textContent =
                    'The computer at ' + data.sender_ip + ' sent you a message:';
                document.getElementById('receiveTextArea').value = data.text;
                showModal('receiveTextModal');
                fetch('/api/confirm_message', {method: 'POST'});
            }
        })
        .catch(() => {});
}

updateStatus();
setInterval(checkForMessages, 2000);

window.onclick = function (event) {
    if (event.target.classList.contains('modal')) {
        event.target.style.display = 'none';
    }
};
"#;

const FILE_SCRIPT: &str = r#"
function confirmDownload(link) {
    return confirm('Download "' + link.dataset.name + '"?');
}

function showChosenFile(input) {
    document.getElementById('uploadFileName').textContent =
        input.files.length > 0 ? 'Selected: ' + input.files[0].name : '';
}

async function submitAndReload(resultId, modalId, request, okText) {
    try {
        const res = await request();
        if (!res.ok) throw new Error(await failureText(res));
        showResult(resultId, true, okText);
        setTimeout(() => { closeModal(modalId); window.location.reload(); }, 1000);
    } catch (err) {
        showResult(resultId, false, 'Error: ' + err.message);
    }
}

function createFile() {
    const name = document.getElementById('newFileName').value.trim();
    const content = document.getElementById('newFileContent').value;
    if (!name.endsWith('.txt')) {
        showResult('createFileResult', false, 'The file name must end with .txt');
        return;
    }
    submitAndReload('createFileResult', 'createFileModal',
        () => postJson('/api/create_file', {filename: name, content: content}),
        'File created.');
}

function createDir() {
    const name = document.getElementById('newDirName').value.trim();
    if (!name) {
        showResult('createDirResult', false, 'The folder name cannot be empty.');
        return;
    }
    submitAndReload('createDirResult', 'createDirModal',
        () => postJson('/api/create_dir', {dirname: name}),
        'Folder created.');
}

async function uploadFile() {
    const input = document.getElementById('uploadFileInput');
    const btn = document.getElementById('uploadBtn');
    if (!input.files.length) {
        showResult('uploadResult', false, 'Choose a file first.');
        return;
    }
    const file = input.files[0];
    const form = new FormData();
    form.append('filename', file.name);
    form.append('file', file);

    btn.disabled = true;
    btn.textContent = 'Uploading...';
    await submitAndReload('uploadResult', 'uploadModal',
        () => fetch('/api/upload', {method: 'POST', body: form}),
        'Upload complete.');
    btn.disabled = false;
    btn.textContent = 'Upload';
}
"#;
