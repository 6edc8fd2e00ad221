//! Prompt templates for the AI conversation mode.

use crate::ai::ReplyContext;

/// Business details injected into the system prompt.
#[derive(Debug, Clone)]
pub struct BusinessProfile {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub city: String,
}

impl Default for BusinessProfile {
    fn default() -> Self {
        Self {
            name: "Artestofados".to_string(),
            phone: "(83) 3241-1234".to_string(),
            email: "contato@artestofados.com.br".to_string(),
            city: "João Pessoa/PB".to_string(),
        }
    }
}

/// System prompt for customer replies.
pub fn system_prompt(business: &BusinessProfile) -> String {
    format!(
        r#"Você é um assistente virtual da empresa {name}, especializada em fabricação e reforma de móveis estofados em {city}.

INFORMAÇÕES DA EMPRESA:
- Nome: {name}
- Localização: {city}
- Telefone: {phone}
- Email: {email}
- Especialidades: Fabricação e reforma de sofás, cadeiras, poltronas, camas

SERVIÇOS OFERECIDOS:
1. FABRICAÇÃO: criação de móveis estofados sob medida (sofás, cadeiras, poltronas, camas estofadas)
2. REFORMA: troca de espuma, revestimento novo, reparo estrutural, modernização do design

INSTRUÇÕES:
- Seja cordial, prestativo e profissional, com emojis moderados
- Responda de forma clara e objetiva, em português do Brasil
- Incentive o cliente a enviar fotos quando relevante
- Sugira visita técnica ou reunião quando necessário
- Mantenha o foco nos serviços da empresa

LIMITAÇÕES:
- NÃO forneça orçamentos específicos sem avaliar o projeto
- NÃO confirme agendamentos, apenas colete preferências
- NÃO prometa prazos
- Mencione que detalhes finais serão confirmados pela equipe"#,
        name = business.name,
        city = business.city,
        phone = business.phone,
        email = business.email,
    )
}

/// Conversation context block appended after the system prompt.
pub fn context_prompt(context: &ReplyContext) -> String {
    let mut out = String::from("CONTEXTO DA CONVERSA:\n");
    out.push_str(&format!("- Nome do cliente: {}\n", context.customer_name));
    if let Some(intent) = context.intent {
        out.push_str(&format!("- Intenção identificada: {intent}\n"));
    }
    if !context.recent.is_empty() {
        out.push_str("- Mensagens anteriores:\n");
        for entry in &context.recent {
            out.push_str(&format!("  {}: {}\n", entry.role, entry.text));
        }
    }
    out
}

pub const CLASSIFY_PROMPT: &str = "Analise a mensagem do cliente e classifique a intenção em uma das categorias:
- fabricacao: Cliente quer fabricar móvel novo
- reforma: Cliente quer reformar móvel existente
- orcamento: Cliente quer saber preços
- agendamento: Cliente quer agendar visita/reunião
- duvida: Cliente tem dúvidas gerais
- cumprimento: Cliente está cumprimentando
- outros: Não se encaixa nas categorias acima

Responda APENAS com a categoria, sem explicações.";

/// Appended to replies that talk about scheduling.
pub const SCHEDULING_SUFFIX: &str =
    "\n\n📅 Nossa equipe entrará em contato para confirmar o melhor horário!";

const SCHEDULING_KEYWORDS: &[&str] = &[
    "agendar",
    "visita",
    "reunião",
    "horário",
    "data",
    "quando",
    "disponibilidade",
];

pub fn mentions_scheduling(reply: &str) -> bool {
    let lower = reply.to_lowercase();
    SCHEDULING_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Apology sent when the model fails or times out.
pub fn fallback_reply(customer: &str, phone: &str) -> String {
    format!(
        "Desculpe, {customer}! 😅\n\nTive um probleminha técnico, mas nossa equipe irá retornar seu contato em breve.\n\n📞 Para urgências: {phone}"
    )
}
