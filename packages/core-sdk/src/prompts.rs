use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;

use crate::models::{ArticleLength, ArticleParams, ArticleTheme, ProviderId};

pub const DEFAULT_IMAGE_PROMPT: &str = "适合文章的精美配图，高质量，专业，逼真";

const OPENAI_WRITER_SYSTEM: &str = "You are a professional writer and content creator. Your task is to create high-quality articles in Markdown format. Focus on substance, clear structure, and engaging style.";
const WRITER_SYSTEM: &str =
    "你是一位专业的文章创作者，善于创作结构清晰、内容专业、语言流畅的高质量文章。请用Markdown格式输出。";

const SCRAPE_SUFFIX: &str = "\n\n请只返回提取的内容，不要添加任何额外解释、引用符号或格式标记。";

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s"'<>()\[\]]+"#).expect("valid url regex"));

fn length_text(length: ArticleLength) -> &'static str {
    match length {
        ArticleLength::Short => "短文(800-1200字)",
        ArticleLength::Medium => "中等长度文章(1500-2500字)",
        ArticleLength::Long => "长文(3000字以上)",
    }
}

fn theme_text(theme: ArticleTheme) -> &'static str {
    match theme {
        ArticleTheme::Modern => "现代简约风格",
        ArticleTheme::Magazine => "杂志风格排版",
        ArticleTheme::Tech => "科技类文章风格",
        ArticleTheme::Business => "商务风格",
        ArticleTheme::Creative => "创意设计风格",
        ArticleTheme::Tutorial => "教程指南风格",
        ArticleTheme::Entertainment => "娱乐风格",
        ArticleTheme::Academic => "学术论文风格",
        ArticleTheme::Media => "自媒体风格",
    }
}

/**
 * \brief 文章生成提示词：长度与风格描述、创作要求、参考资料与参考链接。
 */
pub fn article_prompt(params: &ArticleParams) -> String {
    let mut out = match params.title() {
        Some(title) => format!(
            "请创作一篇高质量的{}文章，标题是\"{}\"。",
            length_text(params.length),
            title
        ),
        None => format!("请创作一篇高质量的{}文章。", length_text(params.length)),
    };

    let prompt = params.prompt.trim();
    if !prompt.is_empty() {
        out.push_str(&format!("\n\n以下是创作要求：{prompt}"));
    }
    let reference = params.reference_text.trim();
    if !reference.is_empty() {
        out.push_str(&format!(
            "\n\n参考资料：\n{reference}\n\n请基于上述参考资料，但不要直接复制。"
        ));
    }
    let links: Vec<&str> = params
        .reference_links
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();
    if !links.is_empty() {
        out.push_str(&format!("\n\n参考链接：\n{}", links.join("\n")));
    }

    out.push_str(&format!(
        "\n\n要求：
1. 文章结构清晰，包含引言、正文和结论
2. 使用Markdown格式，包括适当的标题层级、强调和列表
3. 文章语言自然流畅，内容有深度和见解
4. 避免空洞的废话和重复内容
5. 根据主题提供有价值的信息或观点
6. 使用准确的数据和事实支持论点（如适用）
7. 适合{}的风格呈现

请直接输出完整的文章内容，不要包含额外的解释或注释。",
        theme_text(params.theme)
    ));
    out
}

pub fn writer_system_prompt(provider: ProviderId) -> &'static str {
    match provider {
        ProviderId::OpenAI => OPENAI_WRITER_SYSTEM,
        _ => WRITER_SYSTEM,
    }
}

/**
 * \brief 连接测试的用户消息，百度与月之暗面使用中文。
 */
pub fn test_prompt(provider: ProviderId) -> &'static str {
    match provider {
        ProviderId::Baidu | ProviderId::Moonshot => "你好，测试API连接",
        _ => "Hello, just testing the API connection. Please respond with 'API connection successful'.",
    }
}

pub fn image_prompt(prompt: &str) -> &str {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        DEFAULT_IMAGE_PROMPT
    } else {
        trimmed
    }
}

pub fn extract_images_prompt(links: &[String], count: usize) -> String {
    format!(
        "请从以下链接中提取{count}张图片的URL地址，只返回图片URL列表，每行一个URL，不要有任何解释或其他输出：\n\n{}\n\n注意：只提供原始图片URL，每个URL独占一行，不要有多余文字，不要有编号，不要有Markdown格式。",
        links.join("\n")
    )
}

/**
 * \brief 按站点定制的网页正文抽取提示词。
 */
pub fn scrape_prompt(url: &str) -> String {
    let host = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default();

    let (site, rules) = if host.contains("mp.weixin.qq.com") {
        (
            "微信公众号文章",
            "1. 识别并提取文章标题、作者信息和发布时间
2. 提取文章正文内容，包括所有段落
3. 忽略广告、底部相关推荐和公众号信息
4. 忽略页面中的评论、点赞等互动信息
5. 保留文章中的重要标点符号和格式",
        )
    } else if host.contains("toutiao.com") || host.contains("ixigua.com") {
        (
            "今日头条/西瓜视频文章",
            "1. 识别并提取文章标题、来源和发布时间
2. 提取文章正文内容，包括所有段落
3. 忽略广告、\"相关阅读\"、\"推荐阅读\"等干扰内容
4. 忽略页面中的评论区内容
5. 如果是视频内容，提取视频标题和描述文字",
        )
    } else if host.contains("sohu.com") {
        (
            "搜狐网文章",
            "1. 识别并提取文章标题、作者/来源和发布时间
2. 提取文章正文内容，包括所有段落
3. 忽略页面顶部和侧边栏的导航内容
4. 忽略\"推荐阅读\"、广告等无关内容
5. 忽略文章底部的版权声明、免责声明等附加信息",
        )
    } else if host.contains("baijia.baidu.com") || host.contains("baijiahao.baidu.com") {
        (
            "百家号文章",
            "1. 识别并提取文章标题、作者和发布时间
2. 提取文章正文内容，包括所有段落
3. 忽略\"相关推荐\"、\"更多精彩内容\"等无关内容
4. 忽略广告和推广内容
5. 忽略底部作者简介和推荐关注信息",
        )
    } else if host.contains("qq.com") {
        (
            "腾讯网文章",
            "1. 识别并提取文章标题、作者/来源和发布时间
2. 提取文章正文内容，包括所有段落
3. 忽略页面导航、侧边栏等元素
4. 忽略\"推荐阅读\"、\"热门推荐\"等干扰内容
5. 忽略文章底部的版权声明等附加信息",
        )
    } else {
        (
            "网页",
            "1. 识别并提取文章标题和发布信息
2. 提取文章正文内容，包括所有段落
3. 忽略广告、导航栏、侧边栏等无关元素
4. 忽略评论区、推荐阅读等附加内容
5. 保持原文格式和重要标点符号",
        )
    };

    let target = if site == "网页" {
        "网页的主要文章内容"
    } else {
        "的主要内容"
    };
    let lead = if site == "网页" {
        format!("请访问并提取以下{target}：{url}。")
    } else {
        format!("请访问并提取以下{site}{target}：{url}。")
    };
    format!("{lead}\n提取规则：\n{rules}{SCRAPE_SUFFIX}")
}

/**
 * \brief 给出了标题且正文不以一级标题开头时，补上 `# 标题`。
 */
pub fn finalize_article(content: &str, title: Option<&str>) -> String {
    match title {
        Some(t) if !content.trim_start().starts_with("# ") => format!("# {t}\n\n{content}"),
        _ => content.to_string(),
    }
}

/**
 * \brief 从模型回复中解析图片 URL，最多取 `limit` 个。
 */
pub fn parse_image_urls(text: &str, limit: usize) -> Vec<String> {
    URL_RE
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', '，', '。']).to_string())
        .take(limit)
        .collect()
}
