use std::collections::HashSet;

use serde::Deserialize;

/// 衣装の着せ替え要求と選択状態
///
/// 外部UIからJSON文字列で届く要求を解釈して、上下スロットの
/// アクティブな衣装キーと色を保持する。要求が壊れていても
/// 警告ログを出して現状維持し、描画側を巻き込まない。

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// "#RRGGBB" 形式の色指定をパースする。先頭の#は省略可。
pub fn parse_hex_color(hex: &str) -> Option<Rgb> {
    let s = hex.trim();
    let s = s.strip_prefix('#').unwrap_or(s);
    if s.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&s[0..2], 16).ok()?;
    let g = u8::from_str_radix(&s[2..4], 16).ok()?;
    let b = u8::from_str_radix(&s[4..6], 16).ok()?;
    Some(Rgb { r, g, b })
}

/// 外部から届く着せ替え要求。省略されたフィールドは触らない扱い。
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutfitRequest {
    #[serde(default)]
    pub top_key: Option<String>,
    #[serde(default)]
    pub bottom_key: Option<String>,
    #[serde(default)]
    pub top_color: Option<String>,
    #[serde(default)]
    pub bottom_color: Option<String>,
}

/// スロットの現在の選択
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub key: String,
    pub color: Option<Rgb>,
}

/// 上下2スロットの衣装セレクタ
pub struct OutfitSelector {
    tops: HashSet<String>,
    bottoms: HashSet<String>,
    /// 未知キーの要求で以前の選択を残すか
    pub keep_previous_on_missing_key: bool,
    active_top: Option<Selection>,
    active_bottom: Option<Selection>,
}

impl OutfitSelector {
    pub fn new() -> Self {
        Self {
            tops: HashSet::new(),
            bottoms: HashSet::new(),
            keep_previous_on_missing_key: true,
            active_top: None,
            active_bottom: None,
        }
    }

    pub fn register_top(&mut self, key: &str) {
        if !self.tops.insert(key.to_string()) {
            log::warn!("duplicate top key: {key}");
        }
    }

    pub fn register_bottom(&mut self, key: &str) {
        if !self.bottoms.insert(key.to_string()) {
            log::warn!("duplicate bottom key: {key}");
        }
    }

    pub fn active_top(&self) -> Option<&Selection> {
        self.active_top.as_ref()
    }

    pub fn active_bottom(&self) -> Option<&Selection> {
        self.active_bottom.as_ref()
    }

    /// JSON文字列の要求を適用する。壊れた入力は警告して無視。
    pub fn apply_json(&mut self, json: &str) {
        if json.trim().is_empty() {
            log::warn!("outfit request: empty json");
            return;
        }
        let req: OutfitRequest = match serde_json::from_str(json) {
            Ok(r) => r,
            Err(e) => {
                log::warn!("outfit request parse failed: {e}");
                return;
            }
        };
        self.apply(&req);
    }

    pub fn apply(&mut self, req: &OutfitRequest) {
        if let Some(key) = req.top_key.as_deref() {
            self.active_top = apply_slot(
                &self.tops,
                "top",
                key,
                req.top_color.as_deref(),
                self.active_top.take(),
                self.keep_previous_on_missing_key,
            );
        }
        if let Some(key) = req.bottom_key.as_deref() {
            self.active_bottom = apply_slot(
                &self.bottoms,
                "bottom",
                key,
                req.bottom_color.as_deref(),
                self.active_bottom.take(),
                self.keep_previous_on_missing_key,
            );
        }
    }
}

impl Default for OutfitSelector {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_slot(
    catalog: &HashSet<String>,
    slot: &str,
    key: &str,
    color: Option<&str>,
    previous: Option<Selection>,
    keep_previous: bool,
) -> Option<Selection> {
    // 空キーはスロットを外す指示
    if key.trim().is_empty() {
        return None;
    }

    if !catalog.contains(key) {
        log::warn!("{slot} key not found: {key}");
        return if keep_previous { previous } else { None };
    }

    let color = color.filter(|c| !c.trim().is_empty()).and_then(|c| {
        let parsed = parse_hex_color(c);
        if parsed.is_none() {
            log::warn!("invalid color hex: {c}");
        }
        parsed
    });

    Some(Selection {
        key: key.to_string(),
        color,
    })
}
