use crate::domain::campaign::Campaign;

/// The payload every recipient of a dispatch receives. Rendered once per
/// dispatch and shared read-only between the send workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCampaign {
    pub subject: String,
    pub html: String,
    pub text: String,
}

impl RenderedCampaign {
    pub fn render(campaign: &Campaign) -> RenderedCampaign {
        let preview = campaign
            .preview_text
            .as_deref()
            .map(str::trim)
            .filter(|preview| !preview.is_empty());

        let html = match preview {
            // Mail clients show the first text of the body next to the subject line.
            Some(preview) => format!(
                r#"<div style="display:none;max-height:0;overflow:hidden;">{}</div>{}"#,
                escape_html(preview),
                campaign.content
            ),
            None => campaign.content.clone(),
        };

        RenderedCampaign {
            subject: campaign.subject.clone(),
            html,
            text: html_to_text(&campaign.content),
        }
    }
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Drops markup and collapses whitespace, turning block closers into line breaks.
fn html_to_text(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut tag = String::new();
    let mut in_tag = false;

    for c in html.chars() {
        match c {
            '<' => {
                in_tag = true;
                tag.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                let name = tag
                    .trim_start_matches('/')
                    .split(|c: char| c.is_whitespace() || c == '/')
                    .next()
                    .unwrap_or_default()
                    .to_lowercase();
                if matches!(name.as_str(), "br" | "p" | "div" | "li" | "h1" | "h2" | "h3" | "tr") {
                    text.push('\n');
                }
            }
            _ if in_tag => tag.push(c),
            _ => text.push(c),
        }
    }

    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&");

    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
