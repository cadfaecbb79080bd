//! Scripted help assistant.
//!
//! Replies come from an ordered rule table; the first matching rule wins and
//! a fallback answers everything else. Matching is case-insensitive.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy)]
enum Matcher {
    /// The message starts with one of the words.
    StartsWith(&'static [&'static str]),
    /// The message contains one of the phrases.
    Contains(&'static [&'static str]),
}

impl Matcher {
    fn matches(&self, message: &str) -> bool {
        match self {
            Matcher::StartsWith(words) => words.iter().any(|w| message.starts_with(w)),
            Matcher::Contains(phrases) => phrases.iter().any(|p| message.contains(p)),
        }
    }
}

struct Rule {
    topic: &'static str,
    matcher: Matcher,
    reply: &'static str,
}

const RULES: &[Rule] = &[
    Rule {
        topic: "greeting",
        matcher: Matcher::StartsWith(&["hi", "hello", "hey", "greetings"]),
        reply: "Hello! I'm Satya Mate. Ask me how detection works, what the scores \
                mean, which files are accepted, or how to use the webcam mode.",
    },
    Rule {
        topic: "about",
        matcher: Matcher::Contains(&["what is satya", "about satya"]),
        reply: "Satya analyzes images, video, audio and live webcam frames and reports \
                whether the media looks manipulated, with a confidence score, per-check \
                sub-scores and the regions that raised suspicion.",
    },
    Rule {
        topic: "files",
        matcher: Matcher::Contains(&["file", "upload", "format", "size", "10mb"]),
        reply: "Uploads must match the flow you picked (image/*, video/* or audio/*) and \
                be at most 10MB. Anything else is rejected before analysis starts.",
    },
    Rule {
        topic: "webcam",
        matcher: Matcher::Contains(&["webcam", "camera", "real-time", "realtime", "live"]),
        reply: "In webcam mode a frame is sampled every second while analysis is on. A new \
                frame is only sent once the previous one has been answered, and the last \
                five analyzed frames stay on screen.",
    },
    Rule {
        topic: "scores",
        matcher: Matcher::Contains(&["confidence", "score", "accuracy", "reliable"]),
        reply: "Confidence is how sure the analyzer is about its verdict, from 0 to 100%. \
                The details break that down into individual checks, each scored 0 to 1.",
    },
    Rule {
        topic: "areas",
        matcher: Matcher::Contains(&["box", "area", "region", "overlay", "highlight"]),
        reply: "Highlighted boxes mark suspicious regions: red for facial inconsistencies, \
                orange for texture artifacts, yellow for everything else. Each label shows \
                the region's own confidence.",
    },
    Rule {
        topic: "methods",
        matcher: Matcher::Contains(&["how does it detect", "detection methods", "technique", "how does it work"]),
        reply: "Images are checked for editing traces, GAN artifacts, metadata, facial \
                consistency and texture; video adds temporal, lip-sync, blink-rate and head \
                pose checks; audio looks for voice cloning and unnatural frequency or \
                speech patterns.",
    },
    Rule {
        topic: "api",
        matcher: Matcher::Contains(&["api", "integration", "endpoint", "integrate"]),
        reply: "POST a file to /api/analyze/{image|video|audio} to get an analysis id, then \
                GET /api/analysis/{id} until the result is ready. Webcam frames go to \
                /api/analyze/webcam as base64 JPEG.",
    },
    Rule {
        topic: "privacy",
        matcher: Matcher::Contains(&["privacy", "security", "stored", "delete"]),
        reply: "Results are kept in memory only for the lifetime of the service and can be \
                removed with DELETE /api/analysis/{id}.",
    },
    Rule {
        topic: "support",
        matcher: Matcher::Contains(&["support", "help", "assistance"]),
        reply: "I can explain uploads, webcam analysis, scores and highlighted regions. \
                Try asking \"what does the confidence mean?\"",
    },
];

const FALLBACK: &str = "I can answer questions about how Satya detects manipulated media, \
                        accepted files, webcam analysis, scores and the API. What would you \
                        like to know?";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantRequest {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantReply {
    pub reply: String,
}

/// Answer a free-text question.
pub fn reply(message: &str) -> &'static str {
    let message = message.trim().to_lowercase();
    match RULES.iter().find(|rule| rule.matcher.matches(&message)) {
        Some(rule) => {
            tracing::debug!(topic = rule.topic, "assistant rule matched");
            rule.reply
        }
        None => FALLBACK,
    }
}
