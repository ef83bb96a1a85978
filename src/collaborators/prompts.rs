//! Prompt templates for the "Chill Chacha" journal persona.

use super::{Emotion, HistoryEntry};

const PERSONA: &str = "You are \"Chill Chacha,\" a friendly, wise, middle-aged Indian uncle. \
Your goal is to provide warm, supportive advice.\n\
\n\
Your persona:\n\
* Tone: gentle, reassuring and calm. Always patient and understanding.\n\
* Style: simple, direct and encouraging language with a slightly formal but very warm structure. \
Instead of \"It's gonna be okay,\" you might say \"There is no need to worry, everything will find its way.\"\n\
* Metaphors: you may use simple everyday metaphors (gardening, cooking, weather) to explain your point.\n\
\n\
Rules:\n\
1. Keep it short: a single paragraph of 3-4 sentences. No lists, no special formatting.\n\
2. Do not use words the voice system cannot pronounce in the target language.";

pub const EMOTION_LABELS: &str = "anger, sadness, joy, fear, disgust, surprise, neutral";

pub fn transcription_prompt(language: &str) -> String {
    format!(
        "Transcribe the speech in this audio recording. The speaker is expected to use the \
language with BCP-47 tag {language}. Respond ONLY with the transcript text. If the \
recording contains no intelligible speech, respond with an empty string."
    )
}

pub fn emotion_prompt(transcript: &str) -> String {
    format!(
        "Analyze the following text and detect the predominant emotion expressed. Respond ONLY \
with the emotion detected (one of: {EMOTION_LABELS}).\n\nText: {transcript}"
    )
}

pub fn response_prompt(
    emotion: &Emotion,
    formatted_history: &str,
    transcript: &str,
    language: &str,
) -> String {
    format!(
        "{PERSONA}\n\
IMPORTANT: your entire response must be in the language with BCP-47 tag {language}.\n\
---\n\
Emotion: {emotion}\n\
\n\
Conversation history:\n{history}\n\
Latest user entry: {transcript}\n\
---\n\
Generate your supportive response now, embodying the Chill Chacha persona fully.",
        history = history_or_none(formatted_history),
    )
}

pub fn combined_prompt(formatted_history: &str, transcript: &str, language: &str) -> String {
    format!(
        "{PERSONA}\n\
IMPORTANT: the reply must be in the language with BCP-47 tag {language}.\n\
---\n\
Conversation history:\n{history}\n\
Latest user entry: {transcript}\n\
---\n\
First detect the predominant emotion of the latest user entry (one of: {EMOTION_LABELS}), \
then write your supportive reply. Respond ONLY with a JSON object of the form \
{{\"emotion\": \"<label>\", \"reply\": \"<reply text>\"}}.",
        history = history_or_none(formatted_history),
    )
}

pub fn summary_prompt(entries: &[HistoryEntry]) -> String {
    let mut prompt = String::from(
        "You are Chill Chacha, a wise and friendly Indian uncle.\n\
Summarize the conversation below into a simple, encouraging summary.\n\
Your summary MUST mention both the key points the user brought up and the advice you gave in response.\n\
Keep it light and conversational. Start with something like \"Alright, let's see what we talked about...\"\n\
\n\
Conversation entries:\n",
    );
    for entry in entries {
        prompt.push_str(&format!("**{}:** {}\n", entry.role.as_str(), entry.content));
    }
    prompt
}

pub fn narration_prompt(text: &str) -> String {
    format!("Say warmly and calmly: {text}")
}

fn history_or_none(formatted_history: &str) -> &str {
    if formatted_history.trim().is_empty() {
        "(none yet)"
    } else {
        formatted_history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_prompt_carries_all_inputs() {
        let prompt = response_prompt(
            &Emotion::Sadness,
            "user: hello\nmodel: namaste",
            "I had a rough day",
            "es-ES",
        );
        assert!(prompt.contains("Emotion: sadness"));
        assert!(prompt.contains("user: hello\nmodel: namaste"));
        assert!(prompt.contains("Latest user entry: I had a rough day"));
        assert!(prompt.contains("es-ES"));
    }

    #[test]
    fn empty_history_is_marked() {
        let prompt = combined_prompt("", "hi", "en-US");
        assert!(prompt.contains("(none yet)"));
        assert!(prompt.contains("\"emotion\""));
    }

    #[test]
    fn summary_prompt_lists_entries_in_order() {
        let prompt = summary_prompt(&[
            HistoryEntry::user("work was hard"),
            HistoryEntry::model("rest well"),
        ]);
        let user_at = prompt.find("**user:** work was hard").expect("user line");
        let model_at = prompt.find("**model:** rest well").expect("model line");
        assert!(user_at < model_at);
    }
}
