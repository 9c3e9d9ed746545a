//! Keyword tables for follow-up detection and cuisine inference.

/// Phrases that mean "start over", clearing cached ingredients and suggestions.
pub const NEW_TOPIC_KEYWORDS: &[&str] = &[
    "새로운",
    "새 요리",
    "새 재료",
    "기존 말고",
    "그냥 프랑스식",
    "그냥 이탈리아식",
    "랜덤",
    "무작위",
    "다른 걸",
    "다른 요리",
    "새 추천",
];

/// Phrases that ask for "something else".
pub const OTHER_REQUEST_KEYWORDS: &[&str] = &[
    "다른 거",
    "다른것",
    "다른 요리",
    "다른 메뉴",
    "또 추천",
    "좀 더",
    "more",
    "another",
];

/// Words naming a cuisine style.
pub const STYLE_KEYWORDS: &[&str] = &[
    "한식",
    "중식",
    "일식",
    "프랑스",
    "프랑스식",
    "이탈리아",
    "이탈리아식",
    "스페인",
    "스페인식",
    "지중해",
    "미국",
    "미국식",
    "korean",
    "japanese",
    "chinese",
    "french",
    "italian",
    "spanish",
    "mediterranean",
    "american",
];

/// Words that turn a style mention into a different request.
pub const NON_STYLE_HINTS: &[&str] = &["재료", "레시피", "만들", "요리", "준비", "굽", "볶", "끓"];

/// Pronouns referring back to the last dish.
pub const PRONOUNS: &[&str] = &["그거", "그 음식", "이거", "저거", "그것", "이것"];

/// Broad dish names answered with a list of varieties instead of a recipe.
pub const VAGUE_DISHES: &[&str] = &[
    "파스타", "볶음밥", "커리", "샐러드", "스테이크", "피자", "라면", "국수", "김밥", "밥", "면",
    "탕", "찌개", "볶음", "구이",
];

/// A cuisine style with the chef persona used when prompting for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CuisineProfile {
    pub key: &'static str,
    pub chef: &'static str,
    pub keywords: &'static [&'static str],
}

pub const CUISINE_PROFILES: &[CuisineProfile] = &[
    CuisineProfile {
        key: "한식",
        chef: "강레오, 안성재",
        keywords: &["한식", "korean", "코리안"],
    },
    CuisineProfile {
        key: "중식",
        chef: "Ken Hom",
        keywords: &["중식", "중국", "차이니즈", "chinese"],
    },
    CuisineProfile {
        key: "일식",
        chef: "Yoshihiro Murata",
        keywords: &["일식", "일본", "재패니즈", "japanese", "japan"],
    },
    CuisineProfile {
        key: "프랑스식",
        chef: "Pierre Koffmann",
        keywords: &["프랑스", "프랑스식", "프렌치", "french"],
    },
    CuisineProfile {
        key: "이탈리아식",
        chef: "Massimo Bottura",
        keywords: &["이탈리아", "이탈리아식", "이탈리안", "italian"],
    },
    CuisineProfile {
        key: "스페인식",
        chef: "José Andrés",
        keywords: &["스페인", "스페인식", "spanish"],
    },
    CuisineProfile {
        key: "지중해식",
        chef: "Yotam Ottolenghi",
        keywords: &["지중해", "mediterranean"],
    },
    CuisineProfile {
        key: "미국식",
        chef: "Gordon Ramsay",
        keywords: &["미국", "미국식", "아메리칸", "american"],
    },
];

/// Whether any keyword occurs in `text` (compared lower-cased).
pub fn contains_any(text: &str, keywords: &[&str]) -> bool {
    let lower = text.to_lowercase();
    keywords.iter().any(|k| lower.contains(k))
}

/// First cuisine profile whose keywords appear in `text`.
pub fn infer_cuisine(text: &str) -> Option<&'static CuisineProfile> {
    let lower = text.to_lowercase();
    CUISINE_PROFILES
        .iter()
        .find(|p| p.keywords.iter().any(|k| lower.contains(k)))
}

/// Cuisine profile by its canonical key.
pub fn cuisine_by_key(key: &str) -> Option<&'static CuisineProfile> {
    CUISINE_PROFILES.iter().find(|p| p.key == key.trim())
}

pub fn is_vague_dish(dish: &str) -> bool {
    VAGUE_DISHES.contains(&dish.trim())
}
