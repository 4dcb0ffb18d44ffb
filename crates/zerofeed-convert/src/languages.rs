//! Mapping from "Natural Language :: X" classifiers to language codes.

/// Classifier to language code, sorted by classifier.
const LANGUAGES: &[(&str, &str)] = &[
    ("Natural Language :: Afrikaans", "af"),
    ("Natural Language :: Arabic", "ar"),
    ("Natural Language :: Bengali", "bn"),
    ("Natural Language :: Bosnian", "bs"),
    ("Natural Language :: Bulgarian", "bg"),
    ("Natural Language :: Cantonese", "zh_HK"),
    ("Natural Language :: Catalan", "ca"),
    ("Natural Language :: Chinese (Simplified)", "zh_HANS"),
    ("Natural Language :: Chinese (Traditional)", "zh_HANT"),
    ("Natural Language :: Croatian", "hr"),
    ("Natural Language :: Czech", "cs"),
    ("Natural Language :: Danish", "da"),
    ("Natural Language :: Dutch", "nl"),
    ("Natural Language :: English", "en"),
    ("Natural Language :: Esperanto", "eo"),
    ("Natural Language :: Finnish", "fi"),
    ("Natural Language :: French", "fr"),
    ("Natural Language :: Galician", "gl"),
    ("Natural Language :: German", "de"),
    ("Natural Language :: Greek", "el"),
    ("Natural Language :: Hebrew", "he"),
    ("Natural Language :: Hindi", "hi"),
    ("Natural Language :: Hungarian", "hu"),
    ("Natural Language :: Icelandic", "is"),
    ("Natural Language :: Indonesian", "id"),
    ("Natural Language :: Italian", "it"),
    ("Natural Language :: Japanese", "ja"),
    ("Natural Language :: Javanese", "jv"),
    ("Natural Language :: Korean", "ko"),
    ("Natural Language :: Latin", "la"),
    ("Natural Language :: Latvian", "lv"),
    ("Natural Language :: Macedonian", "mk"),
    ("Natural Language :: Malay", "ms"),
    ("Natural Language :: Marathi", "mr"),
    // There is also nn_NO, so this conversion gets it wrong sometimes.
    ("Natural Language :: Norwegian", "nb_NO"),
    ("Natural Language :: Panjabi", "pa"),
    ("Natural Language :: Persian", "fa_IR"),
    ("Natural Language :: Polish", "pl"),
    ("Natural Language :: Portuguese", "pt_PT"),
    ("Natural Language :: Portuguese (Brazilian)", "pt_BR"),
    ("Natural Language :: Romanian", "ro"),
    ("Natural Language :: Russian", "ru"),
    ("Natural Language :: Serbian", "sr"),
    ("Natural Language :: Slovak", "sk"),
    ("Natural Language :: Slovenian", "sl"),
    ("Natural Language :: Spanish", "es"),
    ("Natural Language :: Swedish", "sv"),
    ("Natural Language :: Tamil", "ta"),
    ("Natural Language :: Telugu", "te"),
    ("Natural Language :: Thai", "th"),
    ("Natural Language :: Turkish", "tr"),
    ("Natural Language :: Ukranian", "uk"),
    ("Natural Language :: Urdu", "ur"),
    ("Natural Language :: Vietnamese", "vi"),
];

/// Language code for a classifier, if it is a known natural language.
pub(crate) fn language_code(classifier: &str) -> Option<&'static str> {
    LANGUAGES
        .binary_search_by(|(key, _)| key.cmp(&classifier))
        .ok()
        .map(|index| LANGUAGES[index].1)
}
