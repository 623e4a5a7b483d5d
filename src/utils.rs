use pulldown_cmark::{html, Event as MdEvent, Options, Parser};
use yew::{AttrValue, Html};

pub fn set_panic_hook() {
    // Better error messages in the browser console if the code ever panics.
    // https://github.com/rustwasm/console_error_panic_hook#readme
    console_error_panic_hook::set_once();
}

pub fn markdown_to_html(text: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);

    let parser = Parser::new_ext(text, options).map(|event| match event {
        MdEvent::SoftBreak => MdEvent::HardBreak,
        // Raw HTML from the model is shown as text, never injected.
        MdEvent::Html(raw) => MdEvent::Text(raw),
        _ => event,
    });

    let mut html_output = String::new();
    html::push_html(&mut html_output, parser);
    format!(r#"<div class="markdown-body">{}</div>"#, html_output)
}

pub fn render_markdown(text: &str) -> Html {
    Html::from_html_unchecked(AttrValue::from(markdown_to_html(text)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_basic_markdown() {
        let html = markdown_to_html("**bold**\nnext");
        assert!(html.starts_with(r#"<div class="markdown-body">"#));
        assert!(html.contains("<strong>bold</strong>"));
        assert!(html.contains("<br />"));
    }

    #[test]
    fn escapes_raw_html() {
        let html = markdown_to_html("<script>alert(1)</script>");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }
}
