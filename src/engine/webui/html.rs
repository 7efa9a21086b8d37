// Gemstream Engine — Web UI Page
//
// Self-contained HTML: three forms, their output regions, and the
// `.sparkle` container. Output HTML and star particles arrive over /ws.

use crate::atoms::constants::{ERROR_SEPARATOR, LOADING_TEXT};
use crate::engine::render::escape_text;

pub fn build_page_html(title: &str, max_upload_bytes: usize) -> String {
    PAGE_TEMPLATE
        .replace("{{TITLE}}", &escape_text(title))
        .replace("{{LOADING}}", &js_string(LOADING_TEXT))
        .replace("{{SEPARATOR}}", &js_string(ERROR_SEPARATOR))
        .replace("{{MAX_UPLOAD}}", &max_upload_bytes.to_string())
}

/// A JSON string literal is a valid JS string literal.
fn js_string(s: &str) -> String {
    serde_json::Value::from(s).to_string()
}

const PAGE_TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{{TITLE}}</title>
<style>
  body { font-family: system-ui, sans-serif; margin: 0; background: #f4f6fb; color: #1d2433; }
  header { padding: 1.5rem 2rem 0; }
  main { display: grid; gap: 1.5rem; padding: 1.5rem 2rem 3rem; max-width: 960px; }
  section { background: #fff; border-radius: 12px; padding: 1.25rem; box-shadow: 0 1px 3px rgba(0,0,0,.08); }
  form { display: flex; flex-wrap: wrap; gap: .5rem; align-items: center; }
  input[type=text], textarea { flex: 1 1 280px; padding: .5rem; font: inherit; }
  textarea { min-height: 5rem; }
  button { padding: .5rem 1rem; font: inherit; cursor: pointer; }
  .output { margin-top: 1rem; line-height: 1.5; overflow-wrap: anywhere; }
  .output pre { background: #f0f2f7; padding: .75rem; overflow-x: auto; }
  .sparkle { position: relative; height: 220px; overflow: hidden; }
  .sparkle h1 { position: absolute; inset: 0; display: grid; place-items: center; margin: 0; }
  .star {
    position: absolute;
    width: var(--star-size);
    height: var(--star-size);
    background: var(--star-color);
    clip-path: polygon(50% 0%, 61% 35%, 98% 35%, 68% 57%, 79% 91%, 50% 70%, 21% 91%, 32% 57%, 2% 35%, 39% 35%);
    animation: star-travel var(--star-life) linear forwards;
    pointer-events: none;
  }
  @keyframes star-travel {
    from { left: var(--start-left); top: var(--start-top); opacity: 1; transform: scale(1) rotate(0deg); }
    to { left: var(--end-left); top: var(--end-top); opacity: 0; transform: scale(.2) rotate(180deg); }
  }
</style>
</head>
<body>
<header class="sparkle"><h1>{{TITLE}}</h1></header>
<main>
  <section id="imageContent">
    <h2>Image</h2>
    <form>
      <input type="file" id="imageInput" accept="image/*">
      <input type="text" name="prompt" placeholder="Ask about the image">
      <button type="submit">Go</button>
    </form>
    <div class="output" data-form="image"></div>
  </section>
  <section id="pdfContent">
    <h2>Document</h2>
    <form>
      <input type="file" id="pdfInput" accept="application/pdf">
      <input type="text" name="pdfPrompt" placeholder="Ask about the PDF">
      <button type="submit">Go</button>
    </form>
    <div class="output" data-form="document"></div>
  </section>
  <section id="textContent">
    <h2>Text</h2>
    <form>
      <textarea name="textPrompt" placeholder="Ask anything"></textarea>
      <button type="submit">Go</button>
    </form>
    <div class="output" data-form="text"></div>
  </section>
</main>
<script>
(() => {
  const LOADING = {{LOADING}};
  const SEPARATOR = {{SEPARATOR}};
  const MAX_UPLOAD = {{MAX_UPLOAD}};
  const sparkle = document.querySelector('.sparkle');
  const outputs = {};
  document.querySelectorAll('.output').forEach(el => { outputs[el.dataset.form] = el; });
  const stars = new Map();

  const scheme = location.protocol === 'https:' ? 'wss' : 'ws';
  const ws = new WebSocket(`${scheme}://${location.host}/ws`);
  ws.binaryType = 'arraybuffer';

  const sendViewport = () => ws.send(JSON.stringify({
    type: 'viewport', width: sparkle.offsetWidth, height: sparkle.offsetHeight,
  }));
  ws.onopen = sendViewport;
  window.addEventListener('resize', () => { if (ws.readyState === WebSocket.OPEN) sendViewport(); });

  ws.onmessage = (ev) => {
    const frame = JSON.parse(ev.data);
    switch (frame.type) {
      case 'output': {
        const out = outputs[frame.form];
        if (!out) return;
        if (frame.mode === 'append') out.innerHTML += frame.html;
        else out.innerHTML = frame.html;
        break;
      }
      case 'star_mount': {
        const star = document.createElement('div');
        star.className = 'star';
        for (const [name, value] of frame.vars) star.style.setProperty(name, value);
        stars.set(frame.id, star);
        sparkle.appendChild(star);
        break;
      }
      case 'star_unmount': {
        const star = stars.get(frame.id);
        if (star) { star.remove(); stars.delete(frame.id); }
        break;
      }
    }
  };

  const isOpen = () => ws.readyState === WebSocket.OPEN;
  const disconnected = (out) => {
    out.innerHTML += SEPARATOR + 'Not connected to the server; reload the page';
  };

  async function submit(form, prompt, fileInput) {
    const out = outputs[form];
    out.textContent = LOADING;
    if (!isOpen()) return disconnected(out);

    const file = fileInput ? fileInput.files[0] : undefined;
    if (!file) {
      ws.send(JSON.stringify({ type: 'submit', form, prompt }));
      return;
    }
    let bytes = null;
    let readError = null;
    if (file.size > MAX_UPLOAD) {
      readError = `file is ${file.size} bytes, over the ${MAX_UPLOAD} byte upload limit`;
    } else {
      try { bytes = await file.arrayBuffer(); } catch (e) { readError = String(e); }
    }
    if (!isOpen()) return disconnected(out);
    ws.send(JSON.stringify({
      type: 'submit', form, prompt,
      file: { name: file.name, media_type: file.type, read_error: readError },
    }));
    if (bytes) ws.send(bytes);
  }

  const bind = (section, form, promptSelector, fileId) => {
    const el = document.querySelector(`#${section} form`);
    el.onsubmit = (ev) => {
      ev.preventDefault();
      const prompt = document.querySelector(`#${section} ${promptSelector}`).value;
      submit(form, prompt, fileId ? document.getElementById(fileId) : null);
    };
  };
  bind('imageContent', 'image', 'input[name="prompt"]', 'imageInput');
  bind('pdfContent', 'document', 'input[name="pdfPrompt"]', 'pdfInput');
  bind('textContent', 'text', 'textarea[name="textPrompt"]', null);
})();
</script>
</body>
</html>
"##;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_has_three_forms_and_container() {
        let html = build_page_html("Lens", 1024);
        assert!(html.contains("<title>Lens</title>"));
        for form in ["data-form=\"image\"", "data-form=\"document\"", "data-form=\"text\""] {
            assert!(html.contains(form), "missing {form}");
        }
        assert!(html.contains("class=\"sparkle\""));
    }

    #[test]
    fn script_shows_loading_locally_and_knows_the_limit() {
        let html = build_page_html("Lens", 2048);
        assert!(html.contains("const LOADING = \"Generating...\";"));
        assert!(html.contains("const SEPARATOR = \"<hr>\";"));
        assert!(html.contains("const MAX_UPLOAD = 2048;"));
        assert!(html.contains("out.textContent = LOADING;"));
        assert!(!html.contains("{{"));
    }

    #[test]
    fn title_is_escaped() {
        let html = build_page_html("<b>x</b>", 1024);
        assert!(html.contains("&lt;b&gt;x&lt;/b&gt;"));
        assert!(!html.contains("<b>x</b>"));
    }
}
