//! Review notification bodies, rendered with handlebars. The HTML template
//! relies on handlebars' default escaping for client-supplied names and notes.

use handlebars::Handlebars;
use serde::Serialize;

use crate::email::EmailError;

/// One reviewed asset as it appears in a client email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewedItem {
    pub file_name: String,
    /// Approval remark or rejection reason
    pub note: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReviewEmail<'a> {
    pub project_name: &'a str,
    pub approved: &'a [ReviewedItem],
    pub rejected: &'a [ReviewedItem],
    /// Portal link clients use to re-upload rejected files
    pub reupload_url: &'a str,
}

#[derive(Debug, Clone)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[derive(Serialize)]
struct ItemView<'a> {
    file_name: &'a str,
    note: Option<&'a str>,
}

#[derive(Serialize)]
struct EmailView<'a> {
    subject: String,
    project_name: &'a str,
    approved_count: usize,
    rejected_count: usize,
    approved: Vec<ItemView<'a>>,
    rejected: Vec<ItemView<'a>>,
    reupload_url: &'a str,
    rule: String,
}

pub fn subject(project_name: &str) -> String {
    format!("Asset Review Complete - {project_name}")
}

pub struct ReviewTemplates {
    handlebars: Handlebars<'static>,
}

impl ReviewTemplates {
    pub fn new() -> Result<Self, EmailError> {
        let mut hb = Handlebars::new();
        hb.register_template_string("review_html", REVIEW_HTML_TEMPLATE)
            .map_err(|e| EmailError::Template(e.to_string()))?;
        hb.register_template_string("review_text", REVIEW_TEXT_TEMPLATE)
            .map_err(|e| EmailError::Template(e.to_string()))?;
        Ok(Self { handlebars: hb })
    }

    pub fn render(&self, email: &ReviewEmail<'_>) -> Result<RenderedEmail, EmailError> {
        let view = EmailView {
            subject: subject(email.project_name),
            project_name: email.project_name,
            approved_count: email.approved.len(),
            rejected_count: email.rejected.len(),
            approved: email.approved.iter().map(item_view).collect(),
            rejected: email.rejected.iter().map(item_view).collect(),
            reupload_url: email.reupload_url,
            rule: "=".repeat(50),
        };

        let html = self
            .handlebars
            .render("review_html", &view)
            .map_err(|e| EmailError::Template(e.to_string()))?;
        let text = self
            .handlebars
            .render("review_text", &view)
            .map_err(|e| EmailError::Template(e.to_string()))?;

        Ok(RenderedEmail {
            subject: view.subject,
            html,
            text,
        })
    }
}

fn item_view(item: &ReviewedItem) -> ItemView<'_> {
    ItemView {
        file_name: &item.file_name,
        note: item.note.as_deref().map(str::trim).filter(|n| !n.is_empty()),
    }
}

const REVIEW_HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>Asset Review - {{project_name}}</title>
</head>
<body style="margin:0;padding:0;font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,Arial,sans-serif;background-color:#f5f5f5;">
  <div style="max-width:600px;margin:0 auto;background-color:#ffffff;">
    <div style="background:linear-gradient(135deg,#3b82f6 0%,#8b5cf6 100%);padding:40px 30px;text-align:center;">
      <h1 style="margin:0;color:#ffffff;font-size:28px;">AssetDrop</h1>
      <p style="margin:10px 0 0 0;color:#e0e7ff;font-size:14px;">Asset Review Notification</p>
    </div>
    <div style="padding:40px 30px;">
      <h2 style="margin:0 0 20px 0;color:#1f2937;font-size:24px;">Your Assets Have Been Reviewed</h2>
      <p style="margin:0 0 30px 0;color:#4b5563;font-size:16px;line-height:1.6;">
        Your submitted assets for <strong>{{project_name}}</strong> have been reviewed. Here's the breakdown:
      </p>
      <table style="width:100%;border-collapse:collapse;margin-bottom:30px;background-color:#f9fafb;border:1px solid #e5e7eb;">
        <tr><td style="padding:10px;color:#059669;"><strong>Approved:</strong></td><td style="padding:10px;text-align:right;color:#059669;font-weight:bold;">{{approved_count}}</td></tr>
        <tr><td style="padding:10px;color:#dc2626;"><strong>Rejected:</strong></td><td style="padding:10px;text-align:right;color:#dc2626;font-weight:bold;">{{rejected_count}}</td></tr>
      </table>
      {{#if approved}}
      <h3 style="margin:0 0 15px 0;color:#059669;font-size:20px;">Approved Assets</h3>
      <div style="background-color:#ecfdf5;border-left:4px solid #059669;padding:20px;margin-bottom:30px;">
        {{#each approved}}
        <p style="margin:0 0 8px 0;color:#065f46;font-weight:600;">{{file_name}}</p>
        {{#if note}}<p style="margin:0 0 15px 0;color:#047857;font-size:14px;font-style:italic;">"{{note}}"</p>{{/if}}
        {{/each}}
      </div>
      {{/if}}
      {{#if rejected}}
      <h3 style="margin:0 0 15px 0;color:#dc2626;font-size:20px;">Rejected Assets - Please Re-upload</h3>
      <div style="background-color:#fef2f2;border-left:4px solid #dc2626;padding:20px;margin-bottom:20px;">
        {{#each rejected}}
        <p style="margin:0 0 8px 0;color:#991b1b;font-weight:600;">{{file_name}}</p>
        {{#if note}}<p style="margin:0 0 15px 0;color:#7f1d1d;font-size:14px;"><strong>Reason:</strong> {{note}}</p>{{/if}}
        {{/each}}
      </div>
      <p style="margin:0 0 20px 0;padding:15px;background-color:#fef3c7;color:#92400e;font-size:14px;">
        <strong>Action Required:</strong> Please upload corrected versions of the rejected files using the link below.
      </p>
      <div style="margin:30px 0;text-align:center;">
        <a href="{{reupload_url}}" style="display:inline-block;background:#3b82f6;color:#ffffff;text-decoration:none;padding:16px 32px;border-radius:8px;font-weight:600;">Re-upload Rejected Files</a>
      </div>
      {{else}}
      <div style="margin:30px 0;padding:20px;background-color:#ecfdf5;text-align:center;">
        <p style="margin:0;color:#065f46;font-weight:600;">All your files have been approved! No further action needed.</p>
      </div>
      {{/if}}
      <p style="margin:30px 0 0 0;color:#6b7280;font-size:14px;">If you have any questions about this review, please contact the project owner directly.</p>
    </div>
    <div style="background-color:#f9fafb;padding:30px;text-align:center;border-top:1px solid #e5e7eb;">
      <p style="margin:0;color:#6b7280;font-size:14px;">This is an automated notification from AssetDrop</p>
    </div>
  </div>
</body>
</html>"#;

// Triple-stash: the plain-text body is never HTML-escaped.
const REVIEW_TEXT_TEMPLATE: &str = r#"{{{subject}}}

Your submitted assets for "{{{project_name}}}" have been reviewed.

SUMMARY:
Approved: {{approved_count}}
Rejected: {{rejected_count}}

{{#if approved}}APPROVED ASSETS:
{{{rule}}}
{{#each approved}}- {{{file_name}}}{{#if note}}
  Note: {{{note}}}{{/if}}
{{/each}}
{{/if}}{{#if rejected}}REJECTED ASSETS - PLEASE RE-UPLOAD:
{{{rule}}}
{{#each rejected}}- {{{file_name}}}{{#if note}}
  Reason: {{{note}}}{{/if}}
{{/each}}
ACTION REQUIRED: Please upload corrected versions of the rejected files.

Re-upload here: {{{reupload_url}}}
{{else}}All your files have been approved! No further action needed.
{{/if}}
If you have any questions, please contact the project owner.

---
This is an automated notification from AssetDrop"#;
