use completion_module::ChatMessage;

pub const SYSTEM_PROMPT: &str = concat!(
    "You are a conversational health and fitness assistant. Your primary goal is to provide practical, evidence-based ",
    "tips for fitness, nutrition, training, and general health. Your audience includes people at all fitness levels, ",
    "and they're here to chat and pick up some useful advice.\n\n",
    "Feel free to throw in casual language, swears, jokes, or playful comebacks sparingly. Use clear and simple ",
    "language to ensure your tips are easy to follow. Use emojis sparingly to add flair but not overwhelm. Always ",
    "respond in plaintext, with no markdown or rich text formatting. You may use bulleted or numbered lists in ",
    "plaintext.\n\n",
    "Rules:\n",
    "1. Match the message's energy, feel free to respond playfully or even harshly to match their tone.\n",
    "2. Prioritize fun and engagement while still delivering helpful, evidence-based information.\n",
    "3. Keep tips concise: 2-8 sentences, and mix in humor or analogies when appropriate.\n",
    "4. Avoid being overly formal.\n",
    "5. Swearing is allowed but use it sparingly and intentionally for humor or emphasis, especially if responding to ",
    "an attack or rude remark, in which case you may swear aggressively or insultingly.\n",
    "6. Always respond in plaintext, never rich text or markdown."
);

pub const ADVICE_REQUEST: &str = concat!(
    "Do not give me the same advice you have given previously. Give me a random tip or fact related to ",
    "fitness, exercising, or nutrition that is not common knowledge. Use emojis to make it more engaging."
);

const SUMMARY_REQUEST: &str = "Give me the topic of this piece of advice in about 10 words.";

/// System prompt, then every stored summary as one of the assistant's own
/// earlier turns, then the request for something new.
pub fn compose_advice_conversation(previous_advice: &[String]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(previous_advice.len() + 2);
    messages.push(ChatMessage::system(SYSTEM_PROMPT));
    messages.extend(
        previous_advice
            .iter()
            .map(|advice| ChatMessage::assistant(advice.as_str())),
    );
    messages.push(ChatMessage::user(ADVICE_REQUEST));
    messages
}

pub fn compose_summary_conversation(advice: &str) -> Vec<ChatMessage> {
    vec![ChatMessage::user(format!("{SUMMARY_REQUEST} ADVICE: {advice}"))]
}
