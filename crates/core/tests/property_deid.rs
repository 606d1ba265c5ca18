use proptest::prelude::*;

use opnote_core::{char_count, sentence_prefix, DeidGate};

fn fragment() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("the patient tolerated the procedure well".to_string()),
        Just("SSN 123-45-6789".to_string()),
        Just("call (212) 555-0142 with questions".to_string()),
        Just("MRN: 8675309".to_string()),
        Just("seen by Dr. Alvarez in clinic".to_string()),
        Just("follow-up on 12/31/2024".to_string()),
        Just("contact nurse@clinic.org".to_string()),
        Just("Patient: Maria Santos".to_string()),
        Just("a 94-year-old male, aged 102".to_string()),
        "[a-z ,.]{0,40}",
    ]
}

proptest! {
    #[test]
    fn scrub_is_idempotent(fragments in proptest::collection::vec(fragment(), 0..8)) {
        let gate = DeidGate::pattern();
        let text = fragments.join(" ");
        let first = gate.scrub(&text).unwrap();
        let second = gate.scrub(&first.clean).unwrap();
        prop_assert_eq!(&first.clean, &second.clean);
        prop_assert!(!second.found_phi);
    }

    #[test]
    fn scrubbed_text_never_retains_ssn_or_phone(fragments in proptest::collection::vec(fragment(), 1..8)) {
        let gate = DeidGate::pattern();
        let text = fragments.join(" ");
        let outcome = gate.scrub(&text).unwrap();
        prop_assert!(!outcome.clean.contains("123-45-6789"));
        prop_assert!(!outcome.clean.contains("555-0142"));
        prop_assert!(!outcome.clean.contains("nurse@clinic.org"));
    }

    #[test]
    fn sentence_prefix_obeys_budget(text in "[a-zA-Z0-9 .!?]{0,120}", max in 0usize..150) {
        if let Some(prefix) = sentence_prefix(&text, max) {
            prop_assert!(char_count(prefix) <= max);
            prop_assert!(text.starts_with(prefix));
            let last = prefix.chars().last();
            prop_assert!(matches!(last, Some('.') | Some('!') | Some('?')));
        }
    }
}
