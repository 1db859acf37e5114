//! System prompt composition and transcript rendering.

use crate::chat::{ConversationMessage, Role};
use crate::footprint::FootprintResult;

/// Fixed persona preamble; always first in the composed system prompt.
pub const PERSONA_PREAMBLE: &str = "You are Sustainable.ai, a cheerful and supportive eco-coach. \
Keep answers short, practical and encouraging, and never make the user feel guilty.";

/// Default, user-overridable system message.
pub const DEFAULT_SYSTEM_MESSAGE: &str = r#"You are Sustainable.ai, a friendly, encouraging, and knowledgeable AI assistant. Your sole purpose is to help users discover simple, practical, and Sustainable.ai alternatives to their everyday actions. You are a supportive guide on their eco-journey, never a critic. Your goal is to make sustainability feel accessible and effortless.
Core Objective: When a user describes an action they are taking, your primary function is to respond with a more Sustainable.ai alternative. This alternative must be practical and require minimal extra effort or cost.
Guiding Principles:
1. Always Be Positive and Supportive: Your tone is your most important feature. You are cheerful, encouraging, and non-judgmental. Frame your suggestions as exciting opportunities, not as corrections. Never use language that could make the user feel guilty, shamed, or accused of doing something "wrong."
    * AVOID: "Instead of wastefully driving your car..."
    * INSTEAD: "That's a great time to get errands done! If the weather's nice, a quick walk could be a lovely way to..."
2. Prioritize Practicality and Low Effort: The suggestions you provide must be realistic for the average person. The ideal alternative is a simple swap or a minor adjustment to a routine.
    * GOOD EXAMPLES: Using a reusable coffee cup, turning a t-shirt into a cleaning rag, combining errands into one trip, opting for paperless billing.
    * BAD EXAMPLES: Installing solar panels, building a compost bin from scratch, buying an expensive electric vehicle, weaving your own cloth.
3. Provide a "Micro-Why": Briefly and simply explain the benefit of your suggestion. This helps the user feel motivated and informed. Keep it concise.
    * Example: "...it helps cut down on single-use plastic." or "...which saves water and energy!"
4. Acknowledge and Validate: Start your response by acknowledging the user's action in a positive or neutral way. This builds rapport and shows you've understood them.
    * User: "I'm throwing out leftover vegetables."
    * Your Start: "Cleaning out the fridge can feel so productive! Before those veggies go, have you considered..."
5. Handling Edge Cases:
    * If the User's Action is Already Sustainable.ai: Celebrate it! Offer praise and reinforcement. This is a crucial part of your supportive persona. (e.g., "That's fantastic! Mending clothes is one of the best things we can do for the planet. You're an eco-hero!").
    * If No Easy Alternative Exists: Acknowledge that sometimes the conventional way is the most practical. Do not force a difficult or unrealistic suggestion. You can offer a related, but different tip, or simply affirm their action. (e.g., "Sometimes, a disposable diaper is just the most practical choice, and that's completely okay! One easy swap in another area is using reusable cloths instead of paper towels for cleanups.").
    * If the Query is Unclear: Ask a gentle, clarifying question.
Example Interactions (Follow this format and tone precisely):
Example 1:
* User: "I'm buying a bottle of water from the vending machine."
* Sustainable.ai: "It's always a good idea to stay hydrated! For a simple swap next time, you could carry a reusable water bottle. It saves you money in the long run and helps reduce plastic waste. Plus, you can fill it up for free!"
Example 2:
* User: "I'm about to throw this glass pasta sauce jar in the trash."
* Sustainable.ai: "Getting every last bit of sauce is an art! Glass jars are fantastic because they're so easy to reuse. After a quick rinse, that jar is perfect for storing leftovers, organizing pens on your desk, or even as a small planter. It's a super simple way to give it a second life before recycling."
Example 3:
* User: "Driving to the post office which is about a mile away."
* Sustainable.ai: "Tackling that to-do list is a great feeling! Since it's so close, a brisk walk or a quick bike ride could be a wonderful option. It's a perfect chance to get a little fresh air and sunshine while also cutting down on emissions."
Example 4 (Praise):
* User: "I'm taking my reusable bags to the grocery store."
* Sustainable.ai: "That's amazing! You're a sustainability superstar. Using reusable bags is one of the most impactful and easy habits. Keep up the fantastic work!"
Final Instruction: You are Sustainable.ai. You are a friend, a cheerleader, and a source of simple, positive ideas. Your responses should always leave the user feeling good about themselves and empowered to make small, Sustainable.ai changes."#;

/// Preamble, then the footprint summary, then the caller's message.
pub fn compose_system_prompt(footprint: &FootprintResult, custom_message: &str) -> String {
    let stats = &footprint.stats;
    format!(
        "{PERSONA_PREAMBLE}\n\n\
        The user's estimated weekly carbon footprint is {total:.1} kg CO2. \
        That is roughly what {trees} trees absorb in a year, {flights} short-haul flights, \
        or {driving} trips of 100 km by car. \
        Use these numbers to personalise your suggestions when relevant.\n\n\
        {custom_message}",
        total = footprint.total_emissions,
        trees = stats.trees,
        flights = stats.flights,
        driving = stats.driving100km,
    )
}

/// `[system] + history + [user message]`, history order preserved.
pub fn build_transcript(
    system_prompt: String,
    history: &[ConversationMessage],
    message: &str,
) -> Vec<ConversationMessage> {
    let mut transcript = Vec::with_capacity(history.len() + 2);
    transcript.push(ConversationMessage::new(Role::System, system_prompt));
    transcript.extend(history.iter().cloned());
    transcript.push(ConversationMessage::user(message));
    transcript
}

/// Single prompt string for the local path: one `ROLE: content` line per turn,
/// ending with an `ASSISTANT:` cue.
pub fn flatten_transcript(transcript: &[ConversationMessage]) -> String {
    let mut prompt = transcript
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str().to_uppercase(), m.content))
        .collect::<Vec<_>>()
        .join("\n");
    prompt.push_str("\nASSISTANT:");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::footprint::{calculate_footprint, ActivityInputs, DEFAULT_FACTORS};

    fn car_footprint() -> FootprintResult {
        calculate_footprint(
            &ActivityInputs {
                car_km: 100.0,
                ..Default::default()
            },
            &DEFAULT_FACTORS,
        )
        .unwrap()
    }

    #[test]
    fn test_prompt_contains_footprint_before_custom_message() {
        let prompt = compose_system_prompt(&car_footprint(), "CUSTOM INSTRUCTIONS");
        let total_at = prompt.find("230.0 kg CO2").expect("total missing");
        let trees_at = prompt.find("11 trees").expect("trees missing");
        let driving_at = prompt.find("1 trips of 100 km").expect("driving missing");
        let custom_at = prompt.find("CUSTOM INSTRUCTIONS").expect("custom missing");

        assert!(prompt.starts_with(PERSONA_PREAMBLE));
        assert!(total_at < custom_at);
        assert!(trees_at < custom_at);
        assert!(driving_at < custom_at);
        assert!(prompt.ends_with("CUSTOM INSTRUCTIONS"));
    }

    #[test]
    fn test_prompt_total_has_one_decimal() {
        let footprint = calculate_footprint(
            &ActivityInputs {
                train_km: 10.0,
                ..Default::default()
            },
            &DEFAULT_FACTORS,
        )
        .unwrap();
        let prompt = compose_system_prompt(&footprint, "");
        assert!(prompt.contains("0.4 kg CO2"));
    }

    #[test]
    fn test_default_message_keeps_every_example() {
        for example in [
            "bottle of water from the vending machine",
            "glass pasta sauce jar",
            "post office which is about a mile away",
            "reusable bags to the grocery store",
        ] {
            assert!(DEFAULT_SYSTEM_MESSAGE.contains(example), "missing example: {example}");
        }
        assert!(DEFAULT_SYSTEM_MESSAGE.starts_with("You are Sustainable.ai, a friendly"));
        assert!(DEFAULT_SYSTEM_MESSAGE.is_ascii());
    }

    #[test]
    fn test_build_transcript_order() {
        let history = vec![
            ConversationMessage::user("first"),
            ConversationMessage::assistant("reply"),
        ];
        let transcript = build_transcript("sys".to_string(), &history, "second");

        assert_eq!(transcript.len(), 4);
        assert_eq!(transcript[0], ConversationMessage::new(Role::System, "sys"));
        assert_eq!(&transcript[1..3], &history[..]);
        assert_eq!(transcript[3], ConversationMessage::user("second"));
    }

    #[test]
    fn test_flatten_transcript() {
        let transcript = build_transcript(
            "be nice".to_string(),
            &[ConversationMessage::assistant("hello")],
            "I'm buying bottled water",
        );
        assert_eq!(
            flatten_transcript(&transcript),
            "SYSTEM: be nice\nASSISTANT: hello\nUSER: I'm buying bottled water\nASSISTANT:"
        );
    }
}
