/// Lowercases, strips Spanish diacritics and collapses whitespace.
///
/// Every keyword and lookup comparison in the booking flow goes through this
/// function, so `"Miércoles"`, `"miercoles"` and `" MIÉRCOLES "` all compare equal.
pub fn fold(text: &str) -> String {
    let mut folded = String::with_capacity(text.len());
    for character in text.chars().flat_map(char::to_lowercase) {
        folded.push(match character {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            other => other,
        });
    }
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Returns true when `folded` contains any of the given keywords as a substring.
pub fn contains_any(folded: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| folded.contains(keyword))
}

/// Returns true when some keyword starts at a word boundary of `folded`.
///
/// Every word of a keyword must begin the corresponding word of the text, so
/// `"hora"` matches `"horas"` and `"horario"` but not `"ahora"`.
pub fn mentions_any(folded: &str, keywords: &[&str]) -> bool {
    let words: Vec<&str> =
        folded.split(|character: char| !character.is_alphanumeric()).filter(|word| !word.is_empty()).collect();
    keywords.iter().any(|keyword| {
        let needle: Vec<&str> = keyword.split_whitespace().collect();
        !needle.is_empty()
            && words.windows(needle.len()).any(|window| {
                window.iter().zip(&needle).all(|(word, key)| word.starts_with(key))
            })
    })
}
