use super::*;

#[test]
fn accepts_chinese_name_unchanged() {
    let token = validate("张三").expect("valid name");
    assert_eq!(token.as_str(), "张三");
}

#[test]
fn trims_surrounding_whitespace() {
    let token = validate("  Alice Chen \n").expect("valid name");
    assert_eq!(token.as_str(), "Alice Chen");
}

#[test]
fn empty_and_blank_input_is_empty() {
    assert_eq!(validate(""), Err(ValidationError::Empty));
    assert_eq!(validate("   \t "), Err(ValidationError::Empty));
}

#[test]
fn twenty_characters_is_the_limit() {
    let at_limit = "a".repeat(MAX_NAME_LEN);
    assert!(validate(&at_limit).is_ok());

    let over_limit = "a".repeat(MAX_NAME_LEN + 1);
    assert_eq!(validate(&over_limit), Err(ValidationError::TooLong));
}

#[test]
fn length_counts_characters_not_bytes() {
    let name = "张".repeat(MAX_NAME_LEN);
    assert!(name.len() > MAX_NAME_LEN);
    assert!(validate(&name).is_ok());
    assert_eq!(
        validate(&"张".repeat(MAX_NAME_LEN + 1)),
        Err(ValidationError::TooLong)
    );
}

#[test]
fn length_is_checked_before_format() {
    let name = format!("{}!", "a".repeat(MAX_NAME_LEN));
    assert_eq!(validate(&name), Err(ValidationError::TooLong));
}

#[test]
fn composed_characters_count_once() {
    // "e" followed by a combining acute accent is one perceived character.
    let composed = "e\u{301}";
    assert_eq!(perceived_len(composed), 1);
    assert_eq!(perceived_len(&composed.repeat(3)), 3);
}

#[test]
fn accepts_separators_digits_and_other_scripts() {
    for name in ["阿依古丽·买买提", "J. R. R. Tolkien", "Ana•Lu", "Ивана", "さくら・みどり", "Class 3"] {
        assert!(validate(name).is_ok(), "expected {name:?} to be accepted");
    }
}

#[test]
fn rejects_symbols_and_punctuation() {
    for name in ["alice!", "<script>", "a/b", "张三@", "O'Brien", "x_y", "😀"] {
        assert_eq!(
            validate(name),
            Err(ValidationError::InvalidFormat),
            "expected {name:?} to be rejected"
        );
    }
}

#[test]
fn validation_errors_render_user_messages() {
    assert_eq!(ValidationError::Empty.to_string(), "please enter your name");
    assert_eq!(
        ValidationError::TooLong.to_string(),
        "name must not exceed 20 characters"
    );
}

#[test]
fn accepts_names_written_with_combining_marks() {
    for name in ["Jose\u{301}", "ก้อง", "Nguye\u{302}\u{303}n", "नमस्ते", "Zoë"] {
        assert!(validate(name).is_ok(), "expected {name:?} to be accepted");
    }
    assert_eq!(perceived_len("Jose\u{301}"), 4);
    assert_eq!(perceived_len("ก้อง"), 3);
}

#[test]
fn combining_marks_need_a_name_character_to_attach_to() {
    for name in ["\u{301}a", "a!\u{301}"] {
        assert_eq!(
            validate(name),
            Err(ValidationError::InvalidFormat),
            "expected {name:?} to be rejected"
        );
    }
}
