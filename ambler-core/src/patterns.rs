//! Static selector and phrase tables consumed by the consent handler and the
//! action handlers. These are data, not behavior; order is priority order.

/// Dismiss buttons of the common consent frameworks.
pub const CONSENT_SELECTORS: &[&str] = &[
    "#onetrust-accept-btn-handler",
    "button#didomi-notice-agree-button",
    ".qc-cmp2-summary-buttons button[mode='primary']",
    "#CybotCookiebotDialogBodyLevelButtonLevelOptinAllowAll",
    "#truste-consent-button",
    "button.sp_choice_type_11",
    ".fc-button.fc-cta-consent",
    "#cmpwelcomebtnyes a",
    "button[data-cookiebanner='accept_button']",
    ".cc-banner .cc-btn:first-child",
    "#accept-recommended-btn-handler",
];

/// Accept-like phrases matched case-insensitively as substrings.
pub const ACCEPT_PHRASES: &[&str] = &[
    "accept all",
    "accept cookies",
    "allow all",
    "i agree",
    "agree & continue",
    "got it",
    "alle akzeptieren",
    "akzeptieren",
    "zustimmen",
    "tout accepter",
    "j'accepte",
    "aceptar todo",
    "aceitar tudo",
    "accetta tutto",
    "alles accepteren",
    "godkänn alla",
];

/// Class/id fragments that mark a cookie/consent/GDPR container.
pub const CONSENT_CONTAINER_HINTS: &[&str] =
    &["cookie", "consent", "gdpr", "privacy", "cmp", "banner"];

/// Keywords that flag an embedded frame as consent-related.
pub const CONSENT_FRAME_KEYWORDS: &[&str] = &[
    "consent",
    "cookie",
    "privacy",
    "cmp",
    "sourcepoint",
    "trustarc",
    "onetrust",
    "didomi",
];

/// Clickable element categories, highest priority first.
pub const CLICKABLE_SELECTORS: &[&str] = &[
    "a[href]:not([href^='javascript'])",
    "button:not([disabled])",
    "[role='button']",
    "input[type='submit']",
    "[role='tab']",
    "summary",
];

/// Hoverable element categories, highest priority first.
pub const HOVERABLE_SELECTORS: &[&str] = &[
    "nav a",
    "a[href]",
    "button:not([disabled])",
    "img",
    "[role='menuitem']",
    "h1, h2, h3",
];

/// Search inputs, first visible match wins.
pub const SEARCH_INPUT_SELECTORS: &[&str] = &[
    "input[type='search']",
    "input[name='q']",
    "input[name='query']",
    "input[name='search']",
    "input[placeholder*='search' i]",
    "input[aria-label*='search' i]",
];

/// Terms typed into search fields.
pub const SEARCH_TERMS: &[&str] = &[
    "news",
    "weather today",
    "best deals",
    "how to",
    "reviews",
    "opening hours",
    "contact",
    "pricing",
];

/// Media control labels tried before direct media-state mutation.
pub const PLAY_CONTROL_SELECTORS: &[&str] = &[
    "button[aria-label*='play' i]",
    "button[title*='play' i]",
    ".ytp-play-button",
    ".vjs-play-control",
    "button.play",
];

/// Close controls for overlays opened by an image zoom.
pub const OVERLAY_CLOSE_SELECTORS: &[&str] = &[
    "button[aria-label*='close' i]",
    "[class*='close']",
    "[class*='dismiss']",
    ".modal [class*='close']",
];
